//! facegate-core: enrollment, training and face-login decisions.
//!
//! Samples are grayscale face crops stored per identity. Training fits an LBPH
//! classifier over every sample and writes the model next to an identity
//! registry; the recognition engine loads that pair once and judges each live
//! frame on its own.

pub mod classifier;
pub mod detector;
pub mod engine;
pub mod enroll;
pub mod lbph;
pub mod registry;
pub mod session;
pub mod source;
pub mod store;
pub mod training;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use classifier::{Classifier, ClassifierError, LabeledSample};
pub use detector::{DetectorError, FaceDetector, SeetaDetector};
pub use engine::{aggregate, decide, EngineError, FrameReport, RecognitionEngine};
pub use enroll::{enroll, EnrollError, EnrollOptions, EnrollOutcome, EnrollProgress};
pub use lbph::{LbphClassifier, LbphModel, LbphParams};
pub use registry::{IdentityRegistry, RegistryError};
pub use session::{run_session, Pacing, SessionError, SessionSummary};
pub use source::{CaptureError, FrameSource};
pub use store::{validate_identity, SampleStore, StoreError};
pub use training::{train, Artifacts, TrainError, TrainSummary};
pub use types::{Decision, Label, Prediction, Region, Status, Verdict};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{horizontal_stripes, vertical_stripes, ScriptedSource, WholeFrameDetector};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn capture(store: &SampleStore, identity: &str, frames: Vec<image::GrayImage>) -> EnrollOutcome {
        let options = EnrollOptions {
            target: frames.len(),
            capture_interval: Duration::ZERO,
            retry_delay: Duration::ZERO,
        };
        enroll(
            store,
            identity,
            &options,
            &mut ScriptedSource::ok(frames),
            &mut WholeFrameDetector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn test_enroll_train_recognize_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path().join("dataset"));
        let artifacts = Artifacts::new(
            dir.path().join("model.lbph.json"),
            dir.path().join("name_mapping.json"),
        );

        let alice = capture(&store, "alice", (0..5).map(|i| vertical_stripes(48, i * 6)).collect());
        let bob = capture(&store, "bob", (0..5).map(|i| horizontal_stripes(48, i * 6)).collect());
        assert_eq!(alice.captured, 5);
        assert_eq!(bob.captured, 5);

        let summary = train(&store, &LbphClassifier::default(), &artifacts).unwrap();
        assert_eq!(summary.samples, 10);

        let mut engine =
            RecognitionEngine::load(WholeFrameDetector, LbphClassifier::default(), &artifacts, 65.0).unwrap();
        let held_out = vertical_stripes(48, 37);
        let report = engine.process_frame(&held_out).unwrap();

        assert_eq!(report.verdicts.len(), 1);
        let verdict = &report.verdicts[0];
        assert_eq!(verdict.decision, Decision::Accept);
        assert_eq!(verdict.identity.as_deref(), Some("alice"));
        assert_eq!(report.status, Status::Welcome("alice".into()));
    }
}
