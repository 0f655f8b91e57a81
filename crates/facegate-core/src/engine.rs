//! Recognition engine: per-face decisions and the per-frame login status.

use crate::classifier::{Classifier, ClassifierError};
use crate::detector::{DetectorError, FaceDetector};
use crate::registry::{IdentityRegistry, RegistryError};
use crate::training::Artifacts;
use crate::types::{Decision, Label, Region, Status, Verdict};
use image::GrayImage;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("missing required files: {}; run `facegate capture` and `facegate train` first", .0.join(", "))]
    MissingArtifacts(Vec<String>),
    #[error("threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f64),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("model and registry do not belong together: {0}; run `facegate train` again")]
    Inconsistent(String),
}

/// Accept iff `distance` is strictly below `threshold`.
pub fn decide(distance: f64, threshold: f64) -> Decision {
    if distance < threshold {
        Decision::Accept
    } else {
        Decision::Reject
    }
}

/// Fold a frame's verdicts, in detection order, into one status.
///
/// The first accepted face wins and later faces cannot change it. Rejections
/// only matter when nothing is accepted. No faces means still scanning.
pub fn aggregate(verdicts: &[Verdict]) -> Status {
    let mut status = Status::Scanning;
    for verdict in verdicts {
        match verdict.decision {
            Decision::Accept => {
                if !matches!(status, Status::Welcome(_)) {
                    status = Status::Welcome(verdict.identity_or_unknown().to_string());
                }
            }
            Decision::Reject => {
                if status == Status::Scanning {
                    status = Status::LoginFailed;
                }
            }
        }
    }
    status
}

/// Verdicts and aggregated status for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub verdicts: Vec<Verdict>,
    pub status: Status,
}

/// Holds the loaded model and registry for the lifetime of a login session.
pub struct RecognitionEngine<D, C: Classifier> {
    detector: D,
    classifier: C,
    model: C::Model,
    identities: BTreeMap<Label, String>,
    threshold: f64,
}

impl<D: FaceDetector, C: Classifier> RecognitionEngine<D, C> {
    /// Load the model and registry pair from disk.
    pub fn load(
        detector: D,
        classifier: C,
        artifacts: &Artifacts,
        threshold: f64,
    ) -> Result<Self, EngineError> {
        let missing = artifacts.missing();
        if !missing.is_empty() {
            return Err(EngineError::MissingArtifacts(
                missing.iter().map(|p| p.display().to_string()).collect(),
            ));
        }

        let registry = IdentityRegistry::load(&artifacts.registry_path)?;
        let model = classifier.load_model(&artifacts.model_path)?;
        tracing::info!(identities = registry.len(), threshold, "model and registry loaded");

        Self::new(detector, classifier, model, &registry, threshold)
    }

    /// Build from an in-memory model. Every label the model can predict must
    /// have a registry entry.
    pub fn new(
        detector: D,
        classifier: C,
        model: C::Model,
        registry: &IdentityRegistry,
        threshold: f64,
    ) -> Result<Self, EngineError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(EngineError::InvalidThreshold(threshold));
        }

        let orphans: Vec<Label> = classifier
            .labels(&model)
            .into_iter()
            .filter(|&l| !registry.contains_label(l))
            .collect();
        if !orphans.is_empty() {
            return Err(EngineError::Inconsistent(format!(
                "model labels {orphans:?} have no registry entry"
            )));
        }

        Ok(Self {
            detector,
            classifier,
            model,
            identities: registry.reverse(),
            threshold,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify one face crop.
    pub fn identify(&self, region: Region, face: &GrayImage) -> Result<Verdict, EngineError> {
        let prediction = self.classifier.predict(&self.model, face)?;
        let decision = decide(prediction.distance, self.threshold);

        let identity = self.identities.get(&prediction.label).cloned();
        if identity.is_none() {
            tracing::warn!(label = prediction.label, "predicted label has no registry entry");
        }

        Ok(Verdict {
            region,
            label: prediction.label,
            identity,
            distance: prediction.distance,
            decision,
        })
    }

    /// Detect, classify and aggregate one frame. Holds no state between frames.
    pub fn process_frame(&mut self, frame: &GrayImage) -> Result<FrameReport, EngineError> {
        let regions = self.detector.detect(frame)?;

        let mut verdicts = Vec::with_capacity(regions.len());
        for region in regions {
            let Some(face) = region.crop(frame) else {
                tracing::debug!(%region, "empty crop; skipping");
                continue;
            };
            let verdict = self.identify(region, &face)?;
            tracing::debug!(
                region = %verdict.region,
                identity = verdict.identity_or_unknown(),
                distance = verdict.distance,
                decision = ?verdict.decision,
                "face verdict"
            );
            verdicts.push(verdict);
        }

        let status = aggregate(&verdicts);
        Ok(FrameReport { verdicts, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LabeledSample;
    use crate::lbph::{LbphClassifier, LbphModel};
    use crate::test_support::{horizontal_stripes, vertical_stripes, FixedDetector, WholeFrameDetector};

    const THRESHOLD: f64 = 65.0;

    fn verdict(decision: Decision, identity: &str) -> Verdict {
        Verdict {
            region: Region::new(0, 0, 10, 10),
            label: 0,
            identity: Some(identity.to_string()),
            distance: 1.0,
            decision,
        }
    }

    fn trained() -> (LbphModel, IdentityRegistry) {
        let mut registry = IdentityRegistry::new();
        let alice = registry.assign("alice");
        let bob = registry.assign("bob");
        let samples: Vec<LabeledSample> = [0u8, 15, 30]
            .into_iter()
            .flat_map(|o| {
                [
                    LabeledSample { image: vertical_stripes(48, o), label: alice },
                    LabeledSample { image: horizontal_stripes(48, o), label: bob },
                ]
            })
            .collect();
        (LbphClassifier::default().train(&samples).unwrap(), registry)
    }

    #[test]
    fn test_decide_strict_inequality() {
        assert_eq!(decide(64.9, THRESHOLD), Decision::Accept);
        assert_eq!(decide(THRESHOLD, THRESHOLD), Decision::Reject);
        assert_eq!(decide(65.1, THRESHOLD), Decision::Reject);
        assert_eq!(decide(0.0, THRESHOLD), Decision::Accept);
    }

    #[test]
    fn test_aggregate_no_faces_is_scanning() {
        assert_eq!(aggregate(&[]), Status::Scanning);
    }

    #[test]
    fn test_aggregate_all_rejected_is_login_failed() {
        let v = [verdict(Decision::Reject, "alice"), verdict(Decision::Reject, "bob")];
        assert_eq!(aggregate(&v), Status::LoginFailed);
    }

    #[test]
    fn test_aggregate_first_acceptance_wins() {
        let v = [
            verdict(Decision::Reject, "mallory"),
            verdict(Decision::Accept, "Alice"),
            verdict(Decision::Accept, "Bob"),
        ];
        assert_eq!(aggregate(&v), Status::Welcome("Alice".into()));
    }

    #[test]
    fn test_aggregate_later_rejection_does_not_downgrade() {
        let v = [verdict(Decision::Accept, "alice"), verdict(Decision::Reject, "bob")];
        assert_eq!(aggregate(&v), Status::Welcome("alice".into()));
    }

    #[test]
    fn test_aggregate_unknown_identity() {
        let mut v = verdict(Decision::Accept, "x");
        v.identity = None;
        assert_eq!(aggregate(&[v]), Status::Welcome("Unknown".into()));
    }

    #[test]
    fn test_invalid_threshold() {
        let (model, registry) = trained();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = RecognitionEngine::new(
                WholeFrameDetector,
                LbphClassifier::default(),
                model.clone(),
                &registry,
                bad,
            )
            .err()
            .unwrap();
            assert!(matches!(err, EngineError::InvalidThreshold(_)));
        }
    }

    #[test]
    fn test_orphan_model_labels_rejected() {
        let (model, _) = trained();
        let mut partial = IdentityRegistry::new();
        partial.assign("alice");
        let err = RecognitionEngine::new(
            WholeFrameDetector,
            LbphClassifier::default(),
            model,
            &partial,
            THRESHOLD,
        )
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Inconsistent(_)));
    }

    #[test]
    fn test_load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::new(dir.path().join("model.json"), dir.path().join("names.json"));
        let err = RecognitionEngine::load(WholeFrameDetector, LbphClassifier::default(), &artifacts, THRESHOLD)
            .err()
            .unwrap();
        match err {
            EngineError::MissingArtifacts(files) => assert_eq!(files.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_process_frame_welcomes_enrolled_face() {
        let (model, registry) = trained();
        let mut engine =
            RecognitionEngine::new(WholeFrameDetector, LbphClassifier::default(), model, &registry, THRESHOLD)
                .unwrap();

        let report = engine.process_frame(&vertical_stripes(48, 40)).unwrap();
        assert_eq!(report.verdicts.len(), 1);
        assert!(report.verdicts[0].is_accepted());
        assert_eq!(report.status, Status::Welcome("alice".into()));

        let report = engine.process_frame(&horizontal_stripes(48, 40)).unwrap();
        assert_eq!(report.status, Status::Welcome("bob".into()));
    }

    #[test]
    fn test_process_frame_rejects_stranger() {
        let (model, registry) = trained();
        let mut engine =
            RecognitionEngine::new(WholeFrameDetector, LbphClassifier::default(), model, &registry, THRESHOLD)
                .unwrap();

        let stranger = GrayImage::from_pixel(48, 48, image::Luma([100]));
        let report = engine.process_frame(&stranger).unwrap();
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].decision, Decision::Reject);
        assert!(report.verdicts[0].distance >= THRESHOLD);
        assert_eq!(report.status, Status::LoginFailed);
    }

    #[test]
    fn test_process_frame_without_faces_keeps_scanning() {
        let (model, registry) = trained();
        let mut engine = RecognitionEngine::new(
            FixedDetector(Vec::new()),
            LbphClassifier::default(),
            model,
            &registry,
            THRESHOLD,
        )
        .unwrap();
        let report = engine.process_frame(&vertical_stripes(48, 0)).unwrap();
        assert!(report.verdicts.is_empty());
        assert_eq!(report.status, Status::Scanning);
    }

    #[test]
    fn test_process_frame_multiple_faces_in_detection_order() {
        let (model, registry) = trained();
        // Left half: featureless stranger. Right half: alice's stripes.
        let frame = GrayImage::from_fn(96, 48, |x, y| {
            if x < 48 {
                image::Luma([100])
            } else {
                *vertical_stripes(48, 0).get_pixel(x - 48, y)
            }
        });
        let detector = FixedDetector(vec![Region::new(0, 0, 48, 48), Region::new(48, 0, 48, 48)]);
        let mut engine =
            RecognitionEngine::new(detector, LbphClassifier::default(), model, &registry, THRESHOLD).unwrap();

        let report = engine.process_frame(&frame).unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[0].decision, Decision::Reject);
        assert_eq!(report.verdicts[1].identity.as_deref(), Some("alice"));
        assert_eq!(report.status, Status::Welcome("alice".into()));
    }

    #[test]
    fn test_frames_are_judged_independently() {
        let (model, registry) = trained();
        let mut engine =
            RecognitionEngine::new(WholeFrameDetector, LbphClassifier::default(), model, &registry, THRESHOLD)
                .unwrap();

        let alice = engine.process_frame(&vertical_stripes(48, 5)).unwrap();
        let stranger = engine
            .process_frame(&GrayImage::from_pixel(48, 48, image::Luma([100])))
            .unwrap();
        let alice_again = engine.process_frame(&vertical_stripes(48, 5)).unwrap();

        assert_eq!(alice.status, Status::Welcome("alice".into()));
        assert_eq!(stranger.status, Status::LoginFailed);
        assert_eq!(alice_again, alice);
    }
}
