use std::collections::BTreeMap;

use serde::Serialize;

use super::records::{Emotion, FileRecord};

pub const DEFAULT_TARGET_CLIPS: usize = 250;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemberStats {
    pub name: String,
    pub total: usize,
    pub emotions: BTreeMap<Emotion, usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total_files: usize,
    pub members: Vec<MemberStats>,
    pub emotions: BTreeMap<Emotion, usize>,
    pub target_clips: usize,
}

impl CatalogStats {
    /// Percent of the clip target reached, capped at 100.
    pub fn progress_percent(&self) -> f64 {
        if self.target_clips == 0 {
            return 100.0;
        }
        (self.total_files as f64 / self.target_clips as f64 * 100.0).min(100.0)
    }

    pub fn remaining(&self) -> usize {
        self.target_clips.saturating_sub(self.total_files)
    }
}

fn zeroed() -> BTreeMap<Emotion, usize> {
    Emotion::ALL.into_iter().map(|e| (e, 0)).collect()
}

/// Tally uploads per team member and emotion.
///
/// `team` members are listed first, in order, even with no uploads; any other
/// uploader is appended in order of first appearance.
pub fn compute(files: &[FileRecord], team: &[String], target_clips: usize) -> CatalogStats {
    let mut members: Vec<MemberStats> = team
        .iter()
        .map(|name| MemberStats {
            name: name.clone(),
            total: 0,
            emotions: zeroed(),
        })
        .collect();
    let mut emotions = zeroed();

    for file in files {
        let uploader = file.uploaded_by.trim();
        if !uploader.is_empty() {
            let idx = match members.iter().position(|m| m.name == uploader) {
                Some(idx) => idx,
                None => {
                    members.push(MemberStats {
                        name: uploader.to_string(),
                        total: 0,
                        emotions: zeroed(),
                    });
                    members.len() - 1
                }
            };
            let member = &mut members[idx];
            member.total += 1;
            if let Some(e) = file.emotion {
                *member.emotions.entry(e).or_default() += 1;
            }
        }
        if let Some(e) = file.emotion {
            *emotions.entry(e).or_default() += 1;
        }
    }

    CatalogStats {
        total_files: files.len(),
        members,
        emotions,
        target_clips,
    }
}
