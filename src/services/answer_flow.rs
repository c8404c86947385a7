use tracing::{info, warn};

use crate::models::{Answer, AnswerId, ClueId};
use crate::services::backend::BackendResult;
use crate::services::remote_data::MutationId;
use crate::services::validation::ValidationError;

/// Comma separated ids; blanks and anything non-numeric are skipped.
pub fn parse_clue_ids(input: &str) -> Vec<ClueId> {
    input
        .split(',')
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .filter_map(|raw| raw.parse::<u64>().ok())
        .map(ClueId)
        .collect()
}

/// A generate call that passed client-side validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    image_clue_ids: Vec<ClueId>,
    riddle_text: String,
}

impl GenerateRequest {
    pub fn new(image_clue_ids: Vec<ClueId>, riddle_text: &str) -> Result<Self, ValidationError> {
        if image_clue_ids.is_empty() {
            return Err(ValidationError::NoClueIds);
        }
        let riddle_text = riddle_text.trim();
        if riddle_text.is_empty() {
            return Err(ValidationError::BlankRiddle);
        }
        Ok(Self {
            image_clue_ids,
            riddle_text: riddle_text.to_string(),
        })
    }

    pub fn into_parts(self) -> (Vec<ClueId>, String) {
        (self.image_clue_ids, self.riddle_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer_id: AnswerId,
    pub used_clue_ids: Vec<ClueId>,
    pub riddle_text: String,
}

/// Local state of the answer card.
#[derive(Default)]
pub struct AnswerDraft {
    pub clue_ids_input: String,
    pending: Option<(MutationId, GenerateRequest)>,
    generated: Option<GeneratedAnswer>,
    verified: bool,
}

impl AnswerDraft {
    pub fn parsed_ids(&self) -> Vec<ClueId> {
        parse_clue_ids(&self.clue_ids_input)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generated(&self) -> Option<&GeneratedAnswer> {
        self.generated.as_ref()
    }

    pub fn can_generate(&self, riddle_text: &str) -> bool {
        !self.is_pending() && self.prepare(riddle_text).is_ok()
    }

    pub fn prepare(&self, riddle_text: &str) -> Result<GenerateRequest, ValidationError> {
        GenerateRequest::new(self.parsed_ids(), riddle_text)
    }

    pub fn mark_pending(&mut self, mutation: MutationId, request: GenerateRequest) {
        self.pending = Some((mutation, request));
    }

    /// Applies the result of the matching generate call. Returns false for
    /// results this draft is not waiting on.
    pub fn finish(&mut self, mutation: MutationId, result: &BackendResult<AnswerId>) -> bool {
        let Some((pending_id, _)) = &self.pending else {
            return false;
        };
        if *pending_id != mutation {
            return false;
        }
        let Some((_, request)) = self.pending.take() else {
            return false;
        };

        if let Ok(answer_id) = result {
            let (used_clue_ids, riddle_text) = request.into_parts();
            info!("Answer {} generated from clues {:?}", answer_id, used_clue_ids);
            self.generated = Some(GeneratedAnswer {
                answer_id: *answer_id,
                used_clue_ids,
                riddle_text,
            });
            self.verified = false;
            self.clue_ids_input.clear();
        }
        true
    }

    /// Rejects an answer that merely repeats the riddle and clears the output.
    /// `Ok(true)` the first time the displayed answer passes.
    pub fn check_loaded(&mut self, answer: &Answer) -> Result<bool, ValidationError> {
        let Some(generated) = &self.generated else {
            return Ok(false);
        };
        if generated.answer_id != answer.id || self.verified {
            return Ok(false);
        }
        if answer.answer_text.trim() == generated.riddle_text.trim() {
            warn!("Answer {} echoes the riddle text", answer.id);
            self.clear_output();
            return Err(ValidationError::EchoedRiddle);
        }
        self.verified = true;
        Ok(true)
    }

    pub fn clear_output(&mut self) {
        self.generated = None;
        self.verified = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Principal;
    use crate::services::backend::BackendError;
    use chrono::Utc;

    fn answer(id: u64, text: &str) -> Answer {
        Answer {
            id: AnswerId(id),
            owner: Principal("me".into()),
            timestamp: Utc::now(),
            answer_text: text.to_string(),
            image_clue_ids: vec![ClueId(1)],
        }
    }

    #[test]
    fn ids_parse_leniently() {
        assert_eq!(
            parse_clue_ids(" 1, 3 ,x, ,5,-2"),
            vec![ClueId(1), ClueId(3), ClueId(5)]
        );
        assert!(parse_clue_ids("   ").is_empty());
    }

    #[test]
    fn validation_blocks_empty_ids_and_blank_riddles() {
        assert_eq!(
            GenerateRequest::new(vec![], "riddle"),
            Err(ValidationError::NoClueIds)
        );
        assert_eq!(
            GenerateRequest::new(vec![ClueId(1)], "  \n"),
            Err(ValidationError::BlankRiddle)
        );
        let request = GenerateRequest::new(vec![ClueId(1)], "  what am I? ").unwrap();
        assert_eq!(request.into_parts().1, "what am I?");
    }

    #[test]
    fn draft_tracks_the_pending_call() {
        let mut draft = AnswerDraft {
            clue_ids_input: "1,3,5".into(),
            ..Default::default()
        };
        assert!(draft.can_generate("what has keys but no locks"));
        assert!(!draft.can_generate(""));

        let request = draft.prepare("what has keys but no locks").unwrap();
        draft.mark_pending(MutationId(4), request);
        assert!(!draft.can_generate("what has keys but no locks"));

        assert!(!draft.finish(MutationId(3), &Ok(AnswerId(1))));
        assert!(draft.finish(MutationId(4), &Ok(AnswerId(1))));

        let generated = draft.generated().unwrap();
        assert_eq!(generated.used_clue_ids, vec![ClueId(1), ClueId(3), ClueId(5)]);
        assert!(draft.clue_ids_input.is_empty());
        assert!(!draft.is_pending());
    }

    #[test]
    fn failed_generation_keeps_the_input() {
        let mut draft = AnswerDraft {
            clue_ids_input: "2".into(),
            ..Default::default()
        };
        let request = draft.prepare("riddle").unwrap();
        draft.mark_pending(MutationId(1), request);
        assert!(draft.finish(MutationId(1), &Err(BackendError::Unauthenticated)));
        assert!(draft.generated().is_none());
        assert_eq!(draft.clue_ids_input, "2");
    }

    #[test]
    fn echoed_answers_are_rejected() {
        let mut draft = AnswerDraft {
            clue_ids_input: "1".into(),
            ..Default::default()
        };
        let request = draft.prepare("What am I?").unwrap();
        draft.mark_pending(MutationId(1), request);
        draft.finish(MutationId(1), &Ok(AnswerId(8)));

        assert_eq!(draft.check_loaded(&answer(7, "What am I?")), Ok(false));
        assert_eq!(
            draft.check_loaded(&answer(8, " What am I? ")),
            Err(ValidationError::EchoedRiddle)
        );
        assert!(draft.generated().is_none());
    }

    #[test]
    fn success_is_reported_once_after_the_echo_check() {
        let mut draft = AnswerDraft::default();
        draft.clue_ids_input = "1".into();
        let request = draft.prepare("What has keys but no locks?").unwrap();
        draft.mark_pending(MutationId(2), request);
        draft.finish(MutationId(2), &Ok(AnswerId(3)));

        assert_eq!(draft.check_loaded(&answer(3, "A piano")), Ok(true));
        assert_eq!(draft.check_loaded(&answer(3, "A piano")), Ok(false));
        assert!(draft.generated().is_some());
    }
}
