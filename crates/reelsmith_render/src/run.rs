use reelsmith_core::slug::slugify;
use reelsmith_core::types::{Stage, StageState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One job: a topic, its slug, and the directory all its artifacts live in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub topic: String,
    pub slug: String,
    pub dir: PathBuf,
    pub states: BTreeMap<Stage, StageState>,
}

impl PipelineRun {
    /// A run for `topic` rooted at `{output_dir}/{slug}`.
    pub fn new(topic: &str, output_dir: &Path) -> Self {
        let slug = slugify(topic);
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            dir: output_dir.join(&slug),
            slug,
            states: Stage::ALL.iter().map(|s| (*s, StageState::Pending)).collect(),
        }
    }

    pub fn artifact(&self, stage: Stage) -> PathBuf {
        self.dir.join(stage.artifact_name(&self.slug))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(format!("{}_ledger.json", self.slug))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}_final.json", self.slug))
    }

    pub fn state(&self, stage: Stage) -> StageState {
        self.states.get(&stage).copied().unwrap_or_default()
    }

    pub(crate) fn set_state(&mut self, stage: Stage, state: StageState) {
        self.states.insert(stage, state);
    }

    /// First stage that is not done, in execution order.
    pub fn current_stage(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .find(|s| self.state(*s) != StageState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced_by_slug() {
        let run = PipelineRun::new("The Life of a Snail", Path::new("/out"));
        assert_eq!(run.slug, "the-life-of-a-snail");
        assert_eq!(run.dir, PathBuf::from("/out/the-life-of-a-snail"));
        assert_eq!(
            run.artifact(Stage::Mix),
            PathBuf::from("/out/the-life-of-a-snail/the-life-of-a-snail_mixed.mp4")
        );
        assert_eq!(
            run.ledger_path(),
            PathBuf::from("/out/the-life-of-a-snail/the-life-of-a-snail_ledger.json")
        );
        assert_eq!(
            run.manifest_path(),
            PathBuf::from("/out/the-life-of-a-snail/the-life-of-a-snail_final.json")
        );
    }

    #[test]
    fn current_stage_advances() {
        let mut run = PipelineRun::new("snail", Path::new("/out"));
        assert_eq!(run.current_stage(), Some(Stage::Voice));
        run.set_state(Stage::Voice, StageState::Done);
        run.set_state(Stage::Transcript, StageState::Done);
        assert_eq!(run.current_stage(), Some(Stage::Source));
        for stage in Stage::ALL {
            run.set_state(stage, StageState::Done);
        }
        assert_eq!(run.current_stage(), None);
    }
}
