//! Display metadata for modes, quiz types and lenses
//!
//! The engine only matches on the behavioural enums. Everything a client needs
//! to render them (labels, icons, one-line descriptions) lives in this table.

use crate::quiz::QuizType;
use crate::state_machine::{Lens, Mode};
use serde::Serialize;

/// Display metadata for one selectable option
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionInfo {
    /// Wire value sent back by clients
    pub id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

/// A thematic lens clients can offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LensDef {
    pub name: &'static str,
    pub description: &'static str,
}

impl LensDef {
    pub fn to_lens(&self) -> Lens {
        Lens::new(self.name, self.description)
    }
}

/// Name of the catalog entry that clears the lens
pub const NO_LENS: &str = "None";

/// Everything a client needs to build its pickers
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub modes: Vec<OptionInfo>,
    pub quiz_types: Vec<OptionInfo>,
    pub lenses: &'static [LensDef],
}

pub fn mode_info(mode: Mode) -> OptionInfo {
    let (label, icon, description) = match mode {
        Mode::Standard => ("Standard", "text.bubble", "Regular tutoring and Q&A"),
        Mode::Writing => ("Writing", "pencil", "Work on essays, creative writing and style"),
        Mode::Debate => ("Debate Me", "debate_mode", "Engage in constructive debate"),
        Mode::Mimic => ("Mimic", "mimic", "Chat with a custom character"),
        Mode::Quiz => ("Quiz Me", "quiz_me", "Test your knowledge with questions"),
    };
    OptionInfo {
        id: mode.as_str(),
        label,
        icon,
        description,
    }
}

pub fn quiz_type_info(quiz_type: QuizType) -> OptionInfo {
    let (label, icon, description) = match quiz_type {
        QuizType::MultipleChoice => (
            "Multiple Choice",
            "list.bullet.circle.fill",
            "Quick questions with 4 options",
        ),
        QuizType::ExtendedResponse => (
            "Extended Response",
            "text.alignleft",
            "Write detailed answers to test deep understanding",
        ),
    };
    OptionInfo {
        id: quiz_type.as_str(),
        label,
        icon,
        description,
    }
}

pub fn all_lenses() -> &'static [LensDef] {
    &[
        LensDef {
            name: NO_LENS,
            description: "No thematic lens",
        },
        LensDef {
            name: "Star Wars",
            description: "Learn through Star Wars analogies",
        },
        LensDef {
            name: "Minecraft",
            description: "Learn through Minecraft building and crafting",
        },
        LensDef {
            name: "Pokemon",
            description: "Learn through Pokemon battles and training",
        },
        LensDef {
            name: "Marvel Avengers",
            description: "Learn through Marvel superheroes and powers",
        },
    ]
}

/// Look up a lens by name, ignoring case. `None` clears the lens.
pub fn find_lens(name: &str) -> Option<&'static LensDef> {
    all_lenses()
        .iter()
        .find(|lens| lens.name.eq_ignore_ascii_case(name.trim()))
}

pub fn catalog() -> Catalog {
    Catalog {
        modes: Mode::ALL.into_iter().map(mode_info).collect(),
        quiz_types: QuizType::ALL.into_iter().map(quiz_type_info).collect(),
        lenses: all_lenses(),
    }
}
