//! Prompt construction for the two task kinds.
//!
//! Everything here is a pure function of its inputs (topic sampling takes the
//! RNG as a parameter). The evaluate prompt always ends with the answer-format
//! rules that `report::extract` depends on.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Prompts;
use crate::domain::QuestionParams;
use crate::report::{CORRECTNESS_LABEL, SPACE_LABEL, TIME_LABEL};
use crate::util::{fill_template, longest_backtick_run};

#[derive(Clone, Debug)]
pub struct PromptBuilder {
  prompts: Prompts,
}

impl PromptBuilder {
  pub fn new(prompts: Prompts) -> Self {
    Self { prompts }
  }

  /// Question prompt using the thread RNG for topic sampling.
  pub fn question(&self, params: &QuestionParams) -> String {
    self.question_with_rng(params, &mut rand::thread_rng())
  }

  /// A caller-supplied instruction is passed through untouched. Otherwise the
  /// configured template is filled; with no topic given, one of the configured
  /// topics is sampled (or the topic clause is left out when there are none).
  pub fn question_with_rng<R: Rng + ?Sized>(&self, params: &QuestionParams, rng: &mut R) -> String {
    if let Some(instruction) = params.instruction.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
      return instruction.to_string();
    }

    let level = params.level.unwrap_or(self.prompts.default_level);
    let topic = params
      .topic
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .or_else(|| self.prompts.topics.choose(rng).cloned());
    let topic_clause = topic.map(|t| format!(" about {t}")).unwrap_or_default();

    fill_template(
      &self.prompts.question_template,
      &[
        ("level", level.as_str()),
        ("topic_clause", &topic_clause),
        ("language", &self.prompts.language),
      ],
    )
  }

  /// Evaluation prompt: question verbatim, code verbatim in a fenced block,
  /// followed by the labeled answer format.
  pub fn evaluate(&self, question: &str, code: &str) -> String {
    let code_block = fenced(code, &self.prompts.language.to_lowercase());
    let body = fill_template(
      &self.prompts.evaluate_template,
      &[
        ("question", question),
        ("code_block", &code_block),
        ("language", &self.prompts.language),
      ],
    );
    format!("{}\n\n{}", body.trim_end(), answer_format())
  }
}

// The fence is always longer than any backtick run inside the code.
fn fenced(code: &str, lang: &str) -> String {
  let fence = "`".repeat(longest_backtick_run(code).max(2) + 1);
  format!("{fence}{lang}\n{code}\n{fence}")
}

fn answer_format() -> String {
  format!(
    "Answer format (required, one label per line, each label at the start of its own line):\n\
     {CORRECTNESS_LABEL}: only the single word Yes or No, nothing else on that line.\n\
     On the next line, give a one-sentence verdict, then explain your reasoning: if the code is wrong, explain the issue; if it is correct, explain why.\n\
     {TIME_LABEL}: the time complexity in Big-O notation.\n\
     {SPACE_LABEL}: the space complexity in Big-O notation."
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn builder() -> PromptBuilder {
    PromptBuilder::new(Prompts::default())
  }

  #[test]
  fn default_question_prompt_matches_template() {
    let p = builder().question(&QuestionParams::default());
    assert_eq!(p, "Give me a random easy-level coding question in Python with examples.");
  }

  #[test]
  fn question_prompt_takes_topic_and_level() {
    let params = QuestionParams { topic: Some("binary trees".into()), level: Some(Difficulty::Hard), instruction: None };
    let p = builder().question(&params);
    assert_eq!(p, "Give me a random hard-level coding question about binary trees in Python with examples.");
  }

  #[test]
  fn caller_instruction_is_passed_through() {
    let params = QuestionParams { instruction: Some("  Ask me about heaps.  ".into()), ..Default::default() };
    assert_eq!(builder().question(&params), "Ask me about heaps.");
  }

  #[test]
  fn configured_topics_are_sampled_when_none_given() {
    let prompts = Prompts { topics: vec!["graphs".into(), "strings".into()], ..Prompts::default() };
    let b = PromptBuilder::new(prompts);
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
      let p = b.question_with_rng(&QuestionParams::default(), &mut rng);
      assert!(p.contains("about graphs") || p.contains("about strings"), "{p}");
    }
  }

  #[test]
  fn evaluate_embeds_question_and_code_verbatim() {
    let code = "def add(a, b):\n    return a + b";
    let p = builder().evaluate("Add two numbers.", code);
    assert!(p.contains("Question: Add two numbers."));
    assert!(p.contains(&format!("```python\n{code}\n```")));
    assert!(p.contains("Correctness:"));
    assert!(p.contains("Time complexity:"));
    assert!(p.contains("Space complexity:"));
  }

  #[test]
  fn empty_inputs_still_produce_a_well_formed_prompt() {
    let p = builder().evaluate("", "");
    assert!(p.contains("```python\n\n```"));
    assert!(p.ends_with("Space complexity: the space complexity in Big-O notation."));
  }

  #[test]
  fn code_with_fences_gets_a_longer_fence() {
    let code = "s = \"```\"";
    let p = builder().evaluate("q", code);
    assert!(p.contains(&format!("````python\n{code}\n````")));
  }

  #[test]
  fn placeholder_text_in_question_is_not_expanded() {
    let p = builder().evaluate("Print {code_block} literally", "print(1)");
    assert!(p.contains("Print {code_block} literally"));
  }

  #[test]
  fn verdict_word_sits_alone_on_the_correctness_line() {
    let p = builder().evaluate("q", "");
    assert!(p.contains(&format!("{CORRECTNESS_LABEL}: only the single word Yes or No")));
    assert!(!p.contains("followed by a one-sentence verdict"));
  }
}
