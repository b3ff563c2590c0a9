pub mod engine;
pub mod states;

pub use engine::{transition, ElicitationController, ElicitationError};
pub use states::{
    AnswerSignal, ElicitationDirective, ElicitationStep, FieldEvent, FieldPrompt, FieldTransition,
};
