use enumset::{EnumSet, EnumSetType};

/// Validation steps that trusted callers may bypass when replaying blocks they already checked.
/// Blocks received from peers must be applied with an empty set.
#[derive(Debug, EnumSetType)]
pub enum Skip {
    TransactionSignatures,
    AuthorityCheck,
    ProducerSignature,
    ProducerScheduleCheck,
    MerkleCheck,
    TaposCheck,
    TransactionDupeCheck,
    ForkDatabase,
    BlockSizeCheck,
    ContractExecution,
}

pub type SkipFlags = EnumSet<Skip>;
