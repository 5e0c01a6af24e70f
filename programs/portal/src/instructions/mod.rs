use anchor_lang::prelude::*;

pub mod batch;
pub mod fulfill;
pub mod fund;
pub mod fund_context;
pub mod fund_for;
pub mod prove;
pub mod publish;
pub mod recover;
pub mod refund;
pub mod withdraw;

pub use batch::*;
pub use fulfill::*;
pub use fund::*;
pub use fund_for::*;
pub use prove::*;
pub use publish::*;
pub use recover::*;
pub use refund::*;
pub use withdraw::*;

#[error_code]
pub enum PortalError {
    // input validation
    InvalidPortal,
    InvalidHash,
    InvalidVault,
    InvalidVaultState,
    InvalidProofAccount,
    InvalidFulfillMarker,
    InvalidExecutor,
    InvalidDispatcher,
    InvalidProver,
    InvalidPermit,
    InvalidCalldata,
    InvalidCallTarget,
    InvalidTokenTransferAccounts,
    InvalidTokenProgram,
    InvalidMint,
    InvalidAta,
    InvalidCreator,
    InvalidCreatorToken,
    InvalidClaimant,
    InvalidClaimantToken,
    InvalidRefundToken,
    InvalidPermitAllowance,
    ArrayLengthMismatch,
    ZeroClaimant,
    // state conflicts; expected under concurrent access and meaning
    // "someone else already did this"
    IntentAlreadyExists,
    IntentAlreadyFulfilled,
    IntentAlreadyFunded,
    RewardsAlreadyWithdrawn,
    // authorization
    UnauthorizedWithdrawal,
    // funding sufficiency, raised only when partial funding is disallowed
    InsufficientNativeReward,
    InsufficientTokenAllowance,
    CannotFundForWithNativeReward,
    CannotRecoverWithNativeReward,
    // route execution
    CallToEoa,
    CallToProver,
    CallFailed,
    // timing
    IntentExpired,
    IntentNotExpired,
    // proof state
    IntentNotFulfilled,
    IntentNotClaimed,
    // arithmetic
    TokenAmountOverflow,
    CallValueOverflow,
}
