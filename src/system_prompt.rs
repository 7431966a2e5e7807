//! System prompt composition and hidden instruction texts
//!
//! `compose` joins a fixed sequence of blocks: base identity, the active mode's
//! instructions, a one-time mode switch notice, the lens, the pacing directive
//! and closing tone guidelines. The same inputs always give the same prompt.

use crate::quiz::{QuizType, COMPLETE_EXAMPLE, FEEDBACK_EXAMPLE};
use crate::state_machine::state::{Lens, Mode};
use std::fmt::Write;

/// Base system prompt establishing the tutor's role
const BASE_PROMPT: &str = r"You are a patient, knowledgeable tutor. Help the student understand concepts deeply rather than just giving answers. Check their understanding as you go and build on what they already know.";

const STANDARD_MODE: &str = r"Engage in regular tutoring mode. Answer questions clearly and thoroughly.
Provide explanations, examples, and help students understand concepts deeply.";

const WRITING_MODE: &str = r"WRITING MODE ACTIVE:
- Guide the writing process without writing for the student
- Ask probing questions to develop their ideas
- Provide feedback on structure, clarity, and style
- Suggest improvements but let them do the actual writing
- Focus on teaching writing skills, not producing content";

const DEBATE_MODE: &str = r"DEBATE MODE ACTIVE:
- Take positions that challenge the student's statements
- Present counter-arguments and alternative perspectives
- Use Socratic questioning to expose weak reasoning
- Remain respectful but persistent in your challenges
- Help them strengthen their arguments by testing them
- If they make a strong point, acknowledge it before presenting counters";

const DEFAULT_ENTITY: &str = "the specified character";

const QUIZ_RULES: &str = r#"QUIZ MODE ACTIVE:
You are running a quiz on the topic the student gave. Every reply MUST be exactly one JSON object and nothing else: no prose before or after it, no markdown code fences.

Record types:
- "question": fields type, number, total, questionText, questionType; optional preamble and hint.
- "feedback": fields type, isCorrect (boolean), explanation; optional userAnswer and encouragement.
- "quiz_complete": fields type, score ("X/Y"), percentage (integer 0-100), strengths (non-empty list), weaknesses (non-empty list), improvementPlan; optional summary and closingMessage.

Flow: ask one question at a time. After the student answers, reply with feedback only. When asked for the next question, reply with the next question. After the last question has feedback and the student continues, reply with quiz_complete.
Use the exact camelCase field names shown."#;

const TONE_GUIDELINES: &str = r"Always be encouraging and supportive. Adapt your teaching style to the student's needs.
Keep responses concise but thorough. Use examples to illustrate concepts when helpful.";

/// Hidden turn appended when leaving quiz mode mid-conversation
pub const QUIZ_ENDED_INSTRUCTION: &str = "[Quiz mode has ended. Stop replying in JSON and return to normal conversational tutoring.]";

/// Hidden turn sent by the frustration control
pub const FRUSTRATION_INSTRUCTION: &str = "[The student is feeling frustrated or stuck. Pause, acknowledge that this material can be hard, then re-explain the most recent idea more simply using a fresh analogy or a smaller step. Finish by asking one short question to check understanding.]";

/// Hidden turn asking for the next quiz record
pub const CONTINUE_QUIZ_INSTRUCTION: &str = "[Continue the quiz: reply with the next question, or with quiz_complete if all questions have been answered.]";

/// Inputs to `compose`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub mode: Mode,
    pub lens: Option<Lens>,
    pub entity_name: Option<String>,
    pub quiz_type: Option<QuizType>,
    /// Mode the conversation just switched away from
    pub switched_from: Option<Mode>,
    pub pacing: Option<String>,
}

fn mode_block(mode: Mode, entity_name: Option<&str>, quiz_type: Option<QuizType>) -> String {
    match mode {
        Mode::Standard => STANDARD_MODE.to_string(),
        Mode::Writing => WRITING_MODE.to_string(),
        Mode::Debate => DEBATE_MODE.to_string(),
        Mode::Mimic => {
            let entity = entity_name
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_ENTITY);
            format!(
                "MIMIC MODE - Acting as {entity}:
- Embody the personality and knowledge of {entity}
- Maintain character while being educational
- Use speech patterns and perspectives appropriate to {entity}
- Reference relevant experiences or viewpoints of {entity}
- Stay helpful and informative despite the roleplay"
            )
        }
        Mode::Quiz => quiz_block(quiz_type.unwrap_or(QuizType::MultipleChoice)),
    }
}

fn quiz_block(quiz_type: QuizType) -> String {
    let mut block = QUIZ_RULES.to_string();
    match quiz_type {
        QuizType::MultipleChoice => block.push_str(
            "\n\nThis is a MULTIPLE CHOICE quiz. Every question uses questionType \"multiple_choice\", has exactly 4 options labelled \"A) ...\" through \"D) ...\", and a correctAnswer that is a single letter A, B, C or D. Never reveal the correct answer before the student responds.",
        ),
        QuizType::ExtendedResponse => block.push_str(
            "\n\nThis is an EXTENDED RESPONSE quiz. Every question uses questionType \"extended_response\" and asks for a written explanation. Do not include options or correctAnswer. Judge answers on understanding, not wording, and explain what a complete answer would include.",
        ),
    }
    let _ = write!(
        block,
        "\n\nExample question:\n{}\n\nExample feedback:\n{FEEDBACK_EXAMPLE}\n\nExample completion:\n{COMPLETE_EXAMPLE}",
        quiz_type.example_question()
    );
    block
}

fn lens_block(lens: &Lens) -> String {
    format!(
        "LEARNING LENS ({}):\n{}\nMake frequent connections to this theme to enhance engagement and understanding.",
        lens.name, lens.description
    )
}

/// Assemble the system prompt
pub fn compose(context: &PromptContext) -> String {
    let mut blocks = vec![
        BASE_PROMPT.to_string(),
        mode_block(
            context.mode,
            context.entity_name.as_deref(),
            context.quiz_type,
        ),
    ];

    if let Some(previous) = context.switched_from.filter(|p| *p != context.mode) {
        blocks.push(format!(
            "MODE SWITCH: The student just switched from {} mode to {} mode. Adjust your approach from this reply onward without repeating earlier content.",
            previous.as_str(),
            context.mode.as_str()
        ));
    }

    if let Some(lens) = &context.lens {
        blocks.push(lens_block(lens));
    }

    if let Some(pacing) = &context.pacing {
        blocks.push(format!("SESSION PACING:\n{pacing}"));
    }

    blocks.push(TONE_GUIDELINES.to_string());
    blocks.join("\n\n")
}

/// Hidden turn placed before the first message of a conversation with a lens
pub fn lens_activation_instruction(lens: &Lens) -> String {
    format!(
        "[The student has chosen the {} learning lens: {}. Frame your explanations through this theme from now on.]",
        lens.name, lens.description
    )
}

/// Hidden turn announcing a lens change mid-conversation
pub fn lens_transition_instruction(from: Option<&Lens>, to: Option<&Lens>) -> String {
    match (from, to) {
        (_, None) => "[The student has turned off the learning lens. Return to standard explanations without the previous theme.]".to_string(),
        (None, Some(to)) => format!(
            "[The student has turned on the {} learning lens: {}. Frame your explanations through this theme from now on.]",
            to.name, to.description
        ),
        (Some(from), Some(to)) => format!(
            "[The student has switched from the {} lens to the {} lens: {}. Drop the previous theme and frame explanations through the new one.]",
            from.name, to.name, to.description
        ),
    }
}
