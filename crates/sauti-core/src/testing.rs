//! In-process stub engines for unit tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::config::Settings;
use crate::engine::{
    RecognitionEngine, RecognitionLoader, SynthesisEngine, SynthesisJob, SynthesisLoader,
    Transcript,
};
use crate::error::{Error, Result};

/// Writes a fixed byte sequence to the output path
pub struct StubSynthesis {
    output: Vec<u8>,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubSynthesis {
    pub fn new(output: &[u8]) -> Self {
        Self {
            output: output.to_vec(),
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write half the output, then fail
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SynthesisEngine for StubSynthesis {
    fn infer(&self, job: &SynthesisJob<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let written = if self.fail {
            &self.output[..self.output.len() / 2]
        } else {
            &self.output[..]
        };
        let result = std::fs::write(job.output_path, written);
        std::thread::sleep(self.delay);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;

        if self.fail {
            return Err(Error::SynthesisFailed("stub engine failure".to_string()));
        }
        Ok(())
    }
}

pub struct StubSynthesisLoader {
    engine: Arc<StubSynthesis>,
    load_delay: Duration,
    failures_left: AtomicUsize,
    loads: AtomicUsize,
}

impl StubSynthesisLoader {
    pub fn new() -> Self {
        Self::with_engine(Arc::new(StubSynthesis::new(b"RIFFstub")))
    }

    pub fn with_engine(engine: Arc<StubSynthesis>) -> Self {
        Self {
            engine,
            load_delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SynthesisLoader for StubSynthesisLoader {
    fn load(&self, _settings: &Settings) -> Result<Arc<dyn SynthesisEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ConfigurationUnavailable(
                "checkpoints missing".to_string(),
            ));
        }
        let engine: Arc<dyn SynthesisEngine> = self.engine.clone();
        Ok(engine)
    }
}

/// A recorded transcription call: path, language hint, file contents
pub type RecordedCall = (PathBuf, Option<String>, Vec<u8>);

/// Model name and thread of every dropped recognition engine
pub type DropLog = Arc<Mutex<Vec<(String, ThreadId)>>>;

pub struct StubRecognition {
    pub model_name: String,
    text: String,
    calls: Mutex<Vec<RecordedCall>>,
    drops: DropLog,
}

impl StubRecognition {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl RecognitionEngine for StubRecognition {
    fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript> {
        let contents = std::fs::read(audio_path).unwrap_or_default();
        self.calls.lock().unwrap().push((
            audio_path.to_path_buf(),
            language.map(String::from),
            contents,
        ));
        Ok(Transcript {
            text: self.text.clone(),
            language: language.map(String::from),
        })
    }
}

impl Drop for StubRecognition {
    fn drop(&mut self) {
        self.drops
            .lock()
            .unwrap()
            .push((self.model_name.clone(), thread::current().id()));
    }
}

/// Keeps only weak references, so the registry owns the engines it loads
pub struct StubRecognitionLoader {
    text: String,
    models: Mutex<Vec<String>>,
    engines: Mutex<Vec<Weak<StubRecognition>>>,
    drops: DropLog,
}

impl StubRecognitionLoader {
    pub fn new() -> Self {
        Self::with_text("  hello there \n")
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            models: Mutex::new(Vec::new()),
            engines: Mutex::new(Vec::new()),
            drops: DropLog::default(),
        }
    }

    pub fn loaded_models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    pub fn last_engine(&self) -> Option<Arc<StubRecognition>> {
        self.engines.lock().unwrap().last().and_then(Weak::upgrade)
    }

    pub fn drops(&self) -> Vec<(String, ThreadId)> {
        self.drops.lock().unwrap().clone()
    }
}

impl RecognitionLoader for StubRecognitionLoader {
    fn load(&self, settings: &Settings) -> Result<Arc<dyn RecognitionEngine>> {
        let engine = Arc::new(StubRecognition {
            model_name: settings.whisper_model_name.clone(),
            text: self.text.clone(),
            calls: Mutex::new(Vec::new()),
            drops: self.drops.clone(),
        });
        self.models
            .lock()
            .unwrap()
            .push(settings.whisper_model_name.clone());
        self.engines.lock().unwrap().push(Arc::downgrade(&engine));
        let engine: Arc<dyn RecognitionEngine> = engine;
        Ok(engine)
    }
}
