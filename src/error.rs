use std::fmt;

/// Stable, pattern-matchable error kinds for the core.
///
/// Grouped the way spec.md §7 groups them (structural / consensus / utxo /
/// mempool / storage / identifiers) rather than as one flat list, so callers
/// can match on a whole group when they only care about the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // -- structural --
    InvalidTransactionSize,
    BadLockTime,
    EmptyInputIDs,
    EmptyScriptHash,
    MissingField(&'static str),

    // -- consensus --
    VersionRegression { parent: u64, block: u64 },
    MisorderedBlockHeight { expected: u64, got: u64 },
    MismatchedBlock,
    BadTimestamp,
    BadBits,
    BadWork,
    MismatchedMerkleRoot,
    WrongCoinbaseTransaction(String),
    OverBlockLimit,
    NegativeFee,

    // -- utxo --
    UtxoNotFound,
    UtxoAlreadySpent,
    CoinbaseImmature,
    RevertUnspent,

    // -- mempool --
    TransactionNotExist,
    PoolFull,
    DustTx,

    // -- storage --
    BlockNotFound,
    TransactionNotFound,
    EvidenceNotFound,
    Corrupt(String),

    // -- identifiers --
    InvalidBlockID(String),
    InvalidTransactionID(String),
    InvalidEvidenceID(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidTransactionSize => write!(f, "invalid transaction size"),
            CoreError::BadLockTime => write!(f, "invalid transaction lock time"),
            CoreError::EmptyInputIDs => write!(f, "got the empty input ids"),
            CoreError::EmptyScriptHash => write!(f, "transaction has output with empty script hash"),
            CoreError::MissingField(name) => write!(f, "missing required field: {name}"),

            CoreError::VersionRegression { parent, block } => {
                write!(f, "version regression: previous block version {parent}, current block version {block}")
            }
            CoreError::MisorderedBlockHeight { expected, got } => {
                write!(f, "misordered block height: expected {expected}, got {got}")
            }
            CoreError::MismatchedBlock => write!(f, "mismatched block"),
            CoreError::BadTimestamp => write!(f, "block timestamp is not in the valid range"),
            CoreError::BadBits => write!(f, "block bits is invalid"),
            CoreError::BadWork => write!(f, "invalid difficulty proof of work"),
            CoreError::MismatchedMerkleRoot => write!(f, "mismatched merkle root"),
            CoreError::WrongCoinbaseTransaction(detail) => write!(f, "wrong coinbase transaction: {detail}"),
            CoreError::OverBlockLimit => write!(f, "block is over the limit"),
            CoreError::NegativeFee => write!(f, "block spends more than its transactions produce"),

            CoreError::UtxoNotFound => write!(f, "fail to find utxo entry"),
            CoreError::UtxoAlreadySpent => write!(f, "utxo has been spent"),
            CoreError::CoinbaseImmature => write!(f, "coinbase utxo is not ready for use"),
            CoreError::RevertUnspent => write!(f, "try to revert an unspent utxo"),

            CoreError::TransactionNotExist => write!(f, "transaction is not in the mempool"),
            CoreError::PoolFull => write!(f, "transaction pool reached the max number"),
            CoreError::DustTx => write!(f, "transaction is dust"),

            CoreError::BlockNotFound => write!(f, "block not found"),
            CoreError::TransactionNotFound => write!(f, "transaction not found"),
            CoreError::EvidenceNotFound => write!(f, "evidence not found"),
            CoreError::Corrupt(detail) => write!(f, "corrupt storage: {detail}"),

            CoreError::InvalidBlockID(id) => write!(f, "invalid block id: {id}"),
            CoreError::InvalidTransactionID(id) => write!(f, "invalid transaction id: {id}"),
            CoreError::InvalidEvidenceID(id) => write!(f, "invalid evidence id: {id}"),
        }
    }
}

impl std::error::Error for CoreError {}

pub type CoreResult<T> = Result<T, CoreError>;
