//! Reporter trait for progress injection
//!
//! Build and compile steps report through this trait so that callers can
//! render progress however they like. Reporting is advisory: it never
//! changes build behavior.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub trait Reporter: Send + Sync {
    /// A new build stage started (e.g. "pre-compile", "compile")
    fn stage(&self, name: &str);

    /// Progress within the current stage
    fn progress(&self, item: &str, current: usize, total: usize);

    /// A warning that does not stop the build
    fn warning(&self, msg: &str);

    /// An artifact was written
    fn finished(&self, artifact: &Path);
}

impl<T: Reporter + ?Sized> Reporter for Arc<T> {
    fn stage(&self, name: &str) {
        (**self).stage(name)
    }
    fn progress(&self, item: &str, current: usize, total: usize) {
        (**self).progress(item, current, total)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn finished(&self, artifact: &Path) {
        (**self).finished(artifact)
    }
}

/// Discards every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn stage(&self, _name: &str) {}
    fn progress(&self, _item: &str, _current: usize, _total: usize) {}
    fn warning(&self, _msg: &str) {}
    fn finished(&self, _artifact: &Path) {}
}

/// Forwards reports to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn stage(&self, name: &str) {
        info!(stage = name, "build stage");
    }
    fn progress(&self, item: &str, current: usize, total: usize) {
        info!(item, current, total, "progress");
    }
    fn warning(&self, msg: &str) {
        warn!("{}", msg);
    }
    fn finished(&self, artifact: &Path) {
        info!(artifact = %artifact.display(), "artifact written");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every report as a line of text
    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        pub events: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn stage(&self, name: &str) {
            self.events.lock().unwrap().push(format!("stage {}", name));
        }
        fn progress(&self, item: &str, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("progress {} {}/{}", item, current, total));
        }
        fn warning(&self, msg: &str) {
            self.events.lock().unwrap().push(format!("warning {}", msg));
        }
        fn finished(&self, artifact: &Path) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished {}", artifact.display()));
        }
    }

    #[test]
    fn test_arc_forwards() {
        let recorder = Arc::new(RecordingReporter::default());
        let shared: Arc<dyn Reporter> = recorder.clone();
        shared.stage("compile");
        shared.progress("a.lua", 1, 2);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["stage compile".to_string(), "progress a.lua 1/2".to_string()]
        );
    }
}
