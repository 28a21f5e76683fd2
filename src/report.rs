// src/report.rs - Per-frame joint angle table over a sealed session
use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::geometry::angle_at_vertex;
use crate::pose::Landmark;
use crate::rig::VISIBILITY_GATE;
use crate::session::Session;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("could not write report: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Flexion angles for one frame, in degrees. A joint reports no angle when
/// any of its three constituent landmarks fails the visibility gate or the
/// frame carries no body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AngleRecord {
    pub frame: u32,
    pub time: f64,
    pub left_elbow_deg: Option<f32>,
    pub right_elbow_deg: Option<f32>,
    pub left_knee_deg: Option<f32>,
    pub right_knee_deg: Option<f32>,
}

pub struct AngleReport {
    records: Vec<AngleRecord>,
}

impl AngleReport {
    pub fn from_session(session: &Session) -> Self {
        let records = session
            .frames()
            .iter()
            .map(|frame| {
                let pose = frame.body_pose();
                let pose = pose.as_ref();
                AngleRecord {
                    frame: frame.index,
                    time: frame.time,
                    left_elbow_deg: pose.and_then(|p| {
                        joint_angle(&p.left_shoulder, &p.left_elbow, &p.left_wrist)
                    }),
                    right_elbow_deg: pose.and_then(|p| {
                        joint_angle(&p.right_shoulder, &p.right_elbow, &p.right_wrist)
                    }),
                    left_knee_deg: pose.and_then(|p| {
                        joint_angle(&p.left_hip, &p.left_knee, &p.left_ankle)
                    }),
                    right_knee_deg: pose.and_then(|p| {
                        joint_angle(&p.right_hip, &p.right_knee, &p.right_ankle)
                    }),
                }
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[AngleRecord] {
        &self.records
    }

    /// Serializes the table as CSV, one row per extracted frame, header
    /// first. Unmeasured joints become empty cells.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for record in &self.records {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf, ReportError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.write_csv(File::create(&path)?)?;
        info!(path = %path.display(), rows = self.records.len(), "angle report written");
        Ok(path)
    }

    /// Plain-text digest: detection statistics plus the observed range of
    /// each tracked joint.
    pub fn summary(&self, session: &Session) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Session: {}", session.source);
        let _ = writeln!(
            out,
            "Frames: {} over {:.2}s at {:.1} fps",
            session.frame_count, session.duration, session.settings.fps
        );
        let rate = if session.frame_count > 0 {
            session.detected_frames as f64 / session.frame_count as f64 * 100.0
        } else {
            0.0
        };
        let _ = writeln!(
            out,
            "Detected: {} of {} frames ({rate:.1}%)",
            session.detected_frames, session.frame_count
        );

        let joints: [(&str, fn(&AngleRecord) -> Option<f32>); 4] = [
            ("Left elbow", |r| r.left_elbow_deg),
            ("Right elbow", |r| r.right_elbow_deg),
            ("Left knee", |r| r.left_knee_deg),
            ("Right knee", |r| r.right_knee_deg),
        ];
        for (label, angle_of) in joints {
            let mut min = f32::INFINITY;
            let mut max = f32::NEG_INFINITY;
            let mut samples = 0u32;
            for record in &self.records {
                if let Some(angle) = angle_of(record) {
                    min = min.min(angle);
                    max = max.max(angle);
                    samples += 1;
                }
            }
            if samples > 0 {
                let _ = writeln!(
                    out,
                    "{label}: {min:.1} to {max:.1} deg over {samples} frames"
                );
            } else {
                let _ = writeln!(out, "{label}: no visible samples");
            }
        }
        out
    }
}

fn joint_angle(a: &Landmark, vertex: &Landmark, c: &Landmark) -> Option<f32> {
    if a.visibility_or_zero() <= VISIBILITY_GATE
        || vertex.visibility_or_zero() <= VISIBILITY_GATE
        || c.visibility_or_zero() <= VISIBILITY_GATE
    {
        return None;
    }
    Some(angle_at_vertex(&a.position(), &vertex.position(), &c.position()).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::BodyLandmark;
    use crate::session::{ExtractionSettings, Frame, SessionDraft};

    fn posed_set(elbow_visibility: Option<f32>) -> Vec<Landmark> {
        let mut landmarks: Vec<Landmark> = (0..BodyLandmark::COUNT)
            .map(|_| Landmark::new(0.5, 0.5, 0.0, Some(0.9)))
            .collect();
        // A square left elbow: shoulder above the elbow, wrist to the side.
        landmarks[BodyLandmark::LeftShoulder as usize] = Landmark::new(0.3, 0.3, 0.0, Some(0.9));
        landmarks[BodyLandmark::LeftElbow as usize] = Landmark::new(0.3, 0.5, 0.0, elbow_visibility);
        landmarks[BodyLandmark::LeftWrist as usize] = Landmark::new(0.5, 0.5, 0.0, Some(0.9));
        // A straight right knee.
        landmarks[BodyLandmark::RightHip as usize] = Landmark::new(0.6, 0.4, 0.0, Some(0.9));
        landmarks[BodyLandmark::RightKnee as usize] = Landmark::new(0.6, 0.6, 0.0, Some(0.9));
        landmarks[BodyLandmark::RightAnkle as usize] = Landmark::new(0.6, 0.8, 0.0, Some(0.9));
        landmarks
    }

    fn session_with(body: Option<Vec<Landmark>>) -> Session {
        let mut draft = SessionDraft::new("clip.mp4", ExtractionSettings::default());
        draft.push(Frame::new(0, 0.0, body, None));
        draft.seal(0.1)
    }

    #[test]
    fn test_angles_for_visible_joints() {
        let report = AngleReport::from_session(&session_with(Some(posed_set(Some(0.9)))));
        let record = &report.records()[0];
        assert!((record.left_elbow_deg.unwrap() - 90.0).abs() < 0.1);
        assert!((record.right_knee_deg.unwrap() - 180.0).abs() < 0.1);
    }

    #[test]
    fn test_hidden_joint_reports_no_angle() {
        let report = AngleReport::from_session(&session_with(Some(posed_set(None))));
        let record = &report.records()[0];
        assert_eq!(record.left_elbow_deg, None);
        assert!(record.right_knee_deg.is_some());
    }

    #[test]
    fn test_frame_without_body_reports_nothing() {
        let report = AngleReport::from_session(&session_with(None));
        let record = &report.records()[0];
        assert_eq!(record.frame, 0);
        assert_eq!(record.left_elbow_deg, None);
        assert_eq!(record.right_elbow_deg, None);
    }

    #[test]
    fn test_csv_has_header_and_empty_cells() {
        let report = AngleReport::from_session(&session_with(Some(posed_set(None))));
        let mut buffer = Vec::new();
        report.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "frame,time,left_elbow_deg,right_elbow_deg,left_knee_deg,right_knee_deg"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("0,0.0,"));
        // Hidden elbow serializes as an empty cell.
        assert!(row.contains(",,"));
    }

    #[test]
    fn test_summary_mentions_ranges_and_gaps() {
        let report = AngleReport::from_session(&session_with(Some(posed_set(None))));
        let session = session_with(Some(posed_set(None)));
        let summary = report.summary(&session);
        assert!(summary.contains("clip.mp4"));
        assert!(summary.contains("Right knee:"));
        assert!(summary.contains("Left elbow: no visible samples"));
    }
}
