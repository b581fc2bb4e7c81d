pub mod engine;
pub mod session;
pub mod states;
pub mod storage;

pub use engine::{FlowTransitionError, WizardEngine, WizardUpdate};
pub use session::{SessionError, WizardSession};
pub use states::{
    IgnoreReason, SubmissionStatus, TransitionOutcome, WizardAction, WizardEvent, WizardOutcome,
    WizardState, WizardStep,
};
pub use storage::{
    InMemoryWizardStorage, JsonFileWizardStorage, StorageError, WizardStorage, WIZARD_STORAGE_KEY,
};
