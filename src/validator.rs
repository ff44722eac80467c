//! Question validation and normalization.
//!
//! Every provider path funnels through `normalize` before results leave the
//! core. One malformed question is dropped with its reason; the rest of the
//! batch survives. Normalization is a fixed point: feeding an already
//! normalized question back through produces an identical object.

use tracing::warn;
use uuid::Uuid;

use crate::domain::{
  Difficulty, GeneratedQuestion, Provenance, QuestionType, RawProviderQuestion,
};
use crate::error::SchemaViolation;
use crate::util::normalize_answer;

pub const MIN_QUESTION_CHARS: usize = 10;
pub const MAX_QUESTION_CHARS: usize = 1000;

const TRUE_ALIASES: &[&str] = &["true", "1", "a"];
const FALSE_ALIASES: &[&str] = &["false", "0", "b"];

/// Normalize one raw question into the canonical schema.
///
/// `provenance` is cloned onto the question; the ambiguous-boolean default
/// appends a warning to that clone.
pub fn normalize(
  raw: RawProviderQuestion,
  provenance: &Provenance,
) -> Result<GeneratedQuestion, SchemaViolation> {
  let question = raw.question.trim().to_string();
  if question.is_empty() {
    return Err(SchemaViolation::MissingField("question"));
  }
  let len = question.chars().count();
  if !(MIN_QUESTION_CHARS..=MAX_QUESTION_CHARS).contains(&len) {
    return Err(SchemaViolation::QuestionLengthOutOfBounds {
      actual: len,
      min: MIN_QUESTION_CHARS,
      max: MAX_QUESTION_CHARS,
    });
  }

  let kind = match raw.question_type.as_deref().map(str::trim) {
    None | Some("") => return Err(SchemaViolation::MissingField("type")),
    Some(s) => QuestionType::parse(s).ok_or_else(|| SchemaViolation::UnknownType(s.into()))?,
  };

  let difficulty = match raw.difficulty.as_deref().map(str::trim) {
    None | Some("") => return Err(SchemaViolation::MissingField("difficulty")),
    Some(s) => Difficulty::parse(s).ok_or_else(|| SchemaViolation::UnknownDifficulty(s.into()))?,
  };

  let explanation = raw
    .explanation
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or(SchemaViolation::MissingField("explanation"))?
    .to_string();

  let options = normalize_options(kind, raw.options)?;

  let mut prov = provenance.clone();
  let correct_index = resolve_correct_index(
    kind,
    &options,
    raw.correct_answer.as_deref(),
    raw.correct_index,
    &mut prov,
  )?;

  Ok(GeneratedQuestion {
    id: raw
      .id
      .filter(|s| !s.trim().is_empty())
      .unwrap_or_else(|| Uuid::new_v4().to_string()),
    kind,
    difficulty,
    question,
    correct_answer: options[correct_index].clone(),
    correct_index,
    options,
    explanation,
    provenance: prov,
  })
}

fn normalize_options(
  kind: QuestionType,
  options: Vec<String>,
) -> Result<Vec<String>, SchemaViolation> {
  let options: Vec<String> = options.into_iter().map(|o| o.trim().to_string()).collect();

  let options = match kind {
    QuestionType::TrueFalse if options.is_empty() => {
      vec!["True".to_string(), "False".to_string()]
    }
    QuestionType::TrueFalse if options.len() != 2 => {
      return Err(SchemaViolation::WrongOptionCount {
        kind: "true_false",
        expected: 2,
        actual: options.len(),
      });
    }
    QuestionType::MultipleChoice if options.len() != 4 => {
      return Err(SchemaViolation::WrongOptionCount {
        kind: "multiple_choice",
        expected: 4,
        actual: options.len(),
      });
    }
    _ => options,
  };

  if let Some(index) = options.iter().position(|o| o.is_empty()) {
    return Err(SchemaViolation::EmptyOption { index });
  }
  Ok(options)
}

/// Resolve the correct option index from whatever combination of answer text
/// and explicit index the provider supplied.
fn resolve_correct_index(
  kind: QuestionType,
  options: &[String],
  answer_text: Option<&str>,
  index: Option<usize>,
  prov: &mut Provenance,
) -> Result<usize, SchemaViolation> {
  let answer_text = answer_text.map(str::trim).filter(|s| !s.is_empty());

  if let Some(i) = index {
    if i >= options.len() {
      return Err(SchemaViolation::IndexOutOfRange { index: i, len: options.len() });
    }
    if let Some(answer) = answer_text {
      if normalize_answer(answer) != normalize_answer(&options[i]) {
        return Err(SchemaViolation::AnswerIndexMismatch { index: i });
      }
    }
    return Ok(i);
  }

  let Some(answer) = answer_text else {
    return Err(SchemaViolation::MissingField("correct_answer"));
  };
  let normalized = normalize_answer(answer);

  let matches: Vec<usize> = options
    .iter()
    .enumerate()
    .filter(|(_, o)| normalize_answer(o) == normalized)
    .map(|(i, _)| i)
    .collect();

  match kind {
    QuestionType::MultipleChoice => match matches.as_slice() {
      [] => Err(SchemaViolation::AnswerMatchesNoOption(answer.into())),
      [i] => Ok(*i),
      // Multiple exact matches after normalization is a defect to report,
      // not something to silently resolve to the first option.
      _ => Err(SchemaViolation::AnswerMatchesMultipleOptions(answer.into())),
    },
    QuestionType::TrueFalse => {
      if let [i] = matches.as_slice() {
        return Ok(*i);
      }
      if TRUE_ALIASES.contains(&normalized.as_str()) {
        return Ok(0);
      }
      if FALSE_ALIASES.contains(&normalized.as_str()) {
        return Ok(1);
      }
      // A single ambiguous boolean should not void an otherwise good batch.
      prov.warnings.push(format!(
        "ambiguous boolean answer {answer:?}; defaulted to option 0"
      ));
      Ok(0)
    }
  }
}

/// Normalize a whole batch, dropping individual violators while keeping the
/// rest. Returns the surviving questions and the reasons for every drop.
pub fn normalize_batch(
  raws: Vec<RawProviderQuestion>,
  provenance: &Provenance,
  allowed_types: &[QuestionType],
  allowed_difficulties: &[Difficulty],
) -> (Vec<GeneratedQuestion>, Vec<SchemaViolation>) {
  let mut kept = Vec::with_capacity(raws.len());
  let mut dropped = Vec::new();
  for raw in raws {
    match normalize(raw, provenance) {
      Ok(q) => {
        if !allowed_types.is_empty() && !allowed_types.contains(&q.kind) {
          dropped.push(SchemaViolation::DisallowedType { kind: q.kind.as_str() });
          continue;
        }
        if !allowed_difficulties.is_empty() && !allowed_difficulties.contains(&q.difficulty) {
          dropped.push(SchemaViolation::DisallowedDifficulty {
            difficulty: q.difficulty.as_str(),
          });
          continue;
        }
        kept.push(q);
      }
      Err(v) => {
        warn!(target: "question_gen", violation = %v, "Dropping malformed question");
        dropped.push(v);
      }
    }
  }
  (kept, dropped)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn prov() -> Provenance {
    Provenance {
      provider: "test".into(),
      model: "test-model".into(),
      latency_ms: 5,
      used_fallback: false,
      context_items: 0,
      warnings: vec![],
    }
  }

  fn raw_mc() -> RawProviderQuestion {
    RawProviderQuestion {
      id: None,
      question_type: Some("multiple_choice".into()),
      difficulty: Some("medium".into()),
      question: "Which organelle produces ATP?".into(),
      options: vec![
        "Nucleus".into(),
        "Mitochondria".into(),
        "Ribosome".into(),
        "Golgi apparatus".into(),
      ],
      correct_answer: Some("Mitochondria".into()),
      correct_index: None,
      explanation: Some("The mitochondria is the powerhouse of the cell.".into()),
    }
  }

  fn raw_tf() -> RawProviderQuestion {
    RawProviderQuestion {
      id: None,
      question_type: Some("true_false".into()),
      difficulty: Some("easy".into()),
      question: "Plants perform photosynthesis.".into(),
      options: vec![],
      correct_answer: Some("true".into()),
      correct_index: None,
      explanation: Some("Covered at the start of the lecture.".into()),
    }
  }

  #[test]
  fn derives_index_from_answer_text_for_multiple_choice() {
    let q = normalize(raw_mc(), &prov()).unwrap();
    assert_eq!(q.correct_index, 1);
    assert_eq!(q.correct_answer, "Mitochondria");
    assert_eq!(q.options.len(), 4);
  }

  #[test]
  fn true_false_defaults_options_and_maps_aliases() {
    let q = normalize(raw_tf(), &prov()).unwrap();
    assert_eq!(q.options, vec!["True", "False"]);
    assert_eq!(q.correct_index, 0);

    let mut raw = raw_tf();
    raw.correct_answer = Some("b".into());
    let q = normalize(raw, &prov()).unwrap();
    assert_eq!(q.correct_index, 1);
    assert_eq!(q.correct_answer, "False");

    let mut raw = raw_tf();
    raw.options = vec!["Yes".into(), "No".into()];
    raw.correct_answer = Some("No".into());
    let q = normalize(raw, &prov()).unwrap();
    assert_eq!(q.correct_index, 1);
  }

  #[test]
  fn ambiguous_boolean_defaults_to_first_option_with_warning() {
    let mut raw = raw_tf();
    raw.correct_answer = Some("probably".into());
    let q = normalize(raw, &prov()).unwrap();
    assert_eq!(q.correct_index, 0);
    assert_eq!(q.provenance.warnings.len(), 1);
    assert!(q.provenance.warnings[0].contains("ambiguous"));
  }

  #[test]
  fn multiple_choice_with_three_options_is_rejected() {
    let mut raw = raw_mc();
    raw.options.pop();
    let err = normalize(raw, &prov()).unwrap_err();
    assert_eq!(
      err,
      SchemaViolation::WrongOptionCount { kind: "multiple_choice", expected: 4, actual: 3 }
    );
  }

  #[test]
  fn answer_matching_no_or_multiple_options_is_a_defect() {
    let mut raw = raw_mc();
    raw.correct_answer = Some("Chloroplast".into());
    assert!(matches!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::AnswerMatchesNoOption(_)
    ));

    let mut raw = raw_mc();
    raw.options[3] = "mitochondria ".into();
    assert!(matches!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::AnswerMatchesMultipleOptions(_)
    ));
  }

  #[test]
  fn explicit_index_must_agree_with_answer_text() {
    let mut raw = raw_mc();
    raw.correct_index = Some(0);
    assert_eq!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::AnswerIndexMismatch { index: 0 }
    );

    let mut raw = raw_mc();
    raw.correct_index = Some(9);
    assert_eq!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::IndexOutOfRange { index: 9, len: 4 }
    );

    let mut raw = raw_mc();
    raw.correct_index = Some(1);
    raw.correct_answer = None;
    let q = normalize(raw, &prov()).unwrap();
    assert_eq!(q.correct_answer, "Mitochondria");
  }

  #[test]
  fn missing_required_fields_are_named() {
    let mut raw = raw_mc();
    raw.explanation = None;
    assert_eq!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::MissingField("explanation")
    );

    let mut raw = raw_mc();
    raw.question_type = None;
    assert_eq!(normalize(raw, &prov()).unwrap_err(), SchemaViolation::MissingField("type"));

    let mut raw = raw_mc();
    raw.correct_answer = None;
    assert_eq!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::MissingField("correct_answer")
    );
  }

  #[test]
  fn question_length_bounds_are_enforced() {
    let mut raw = raw_mc();
    raw.question = "Too short".into();
    assert!(matches!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::QuestionLengthOutOfBounds { .. }
    ));

    let mut raw = raw_mc();
    raw.question = "x".repeat(1001);
    assert!(matches!(
      normalize(raw, &prov()).unwrap_err(),
      SchemaViolation::QuestionLengthOutOfBounds { .. }
    ));
  }

  #[test]
  fn normalization_is_idempotent() {
    let first = normalize(raw_mc(), &prov()).unwrap();
    let again = RawProviderQuestion {
      id: Some(first.id.clone()),
      question_type: Some(first.kind.as_str().into()),
      difficulty: Some(first.difficulty.as_str().into()),
      question: first.question.clone(),
      options: first.options.clone(),
      correct_answer: Some(first.correct_answer.clone()),
      correct_index: Some(first.correct_index),
      explanation: Some(first.explanation.clone()),
    };
    let second = normalize(again, &first.provenance).unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn batch_drops_violators_and_keeps_the_rest() {
    let mut bad = raw_mc();
    bad.options.pop();
    let (kept, dropped) = normalize_batch(
      vec![raw_mc(), bad, raw_tf()],
      &prov(),
      &[],
      &[],
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(dropped.len(), 1);
  }

  #[test]
  fn batch_filters_disallowed_types_and_difficulties() {
    let (kept, dropped) = normalize_batch(
      vec![raw_mc(), raw_tf()],
      &prov(),
      &[QuestionType::TrueFalse],
      &[],
    );
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].kind, QuestionType::TrueFalse);
    assert_eq!(dropped, vec![SchemaViolation::DisallowedType { kind: "multiple_choice" }]);

    let (kept, dropped) = normalize_batch(
      vec![raw_mc(), raw_tf()],
      &prov(),
      &[],
      &[Difficulty::Hard],
    );
    assert!(kept.is_empty());
    assert_eq!(dropped.len(), 2);
  }
}
