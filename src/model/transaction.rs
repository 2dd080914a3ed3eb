//! Steps of the doctor recovery transaction

use std::fmt;

/// One step of the doctor transaction, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoctorStep {
    FindDevice,
    CreateKeys,
    SaveOldKeys,
    LoadNewKeys,
    RegisterKey,
    Confirm,
}

impl DoctorStep {
    pub const SEQUENCE: [DoctorStep; 6] = [
        DoctorStep::FindDevice,
        DoctorStep::CreateKeys,
        DoctorStep::SaveOldKeys,
        DoctorStep::LoadNewKeys,
        DoctorStep::RegisterKey,
        DoctorStep::Confirm,
    ];

    /// A failing best-effort step is reported but does not abort the transaction
    pub fn is_best_effort(self) -> bool {
        matches!(self, DoctorStep::SaveOldKeys)
    }

    pub fn description(self) -> &'static str {
        match self {
            DoctorStep::FindDevice => "finding a DFU device",
            DoctorStep::CreateKeys => "creating new keys",
            DoctorStep::SaveOldKeys => "saving old keys",
            DoctorStep::LoadNewKeys => "loading new keys",
            DoctorStep::RegisterKey => "registering the public key with the cloud",
            DoctorStep::Confirm => "confirming new keys",
        }
    }
}

impl fmt::Display for DoctorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Progress record of one doctor run; lives for one invocation only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningTransaction {
    completed: Vec<DoctorStep>,
    skipped: Vec<(DoctorStep, String)>,
}

impl ProvisioningTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&mut self, step: DoctorStep) {
        self.completed.push(step);
    }

    /// Record a best-effort step that failed
    pub fn skip(&mut self, step: DoctorStep, reason: String) {
        self.skipped.push((step, reason));
    }

    pub fn completed(&self) -> &[DoctorStep] {
        &self.completed
    }

    pub fn skipped(&self) -> &[(DoctorStep, String)] {
        &self.skipped
    }
}
