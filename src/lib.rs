//! Optimistic state synchronization for a backend-authoritative game
//! economy: currency balances, inventory ownership/equip state and
//! achievement claims are mutated locally before the server confirms,
//! shown immediately, and reconciled (or rolled back) once the server
//! answers.
//!
//! The pieces fit together like this: an [`session::EconomySession`] owns
//! the in-memory [`economy::EconomyCache`] and the
//! [`coordinator::OperationCoordinator`], which drives every operation
//! through apply → remote call → confirm/rollback against a
//! [`gateway::RemoteGateway`] implementation. Subscribers watch the
//! [`events::ChangeNotifier`] stream to learn whether a change is still
//! optimistic, confirmed, corrected or rolled back.

pub mod coordinator;

pub mod economy;

pub mod events;

pub mod gateway;

pub mod mirror;

pub mod pending;

pub mod session;

pub mod test_helpers;

pub use coordinator::{
    BulkClaimReport,
    ClaimCandidate,
    OperationCoordinator,
    OperationError,
    OperationKind,
    OperationReceipt,
    OperationRequest,
    Outcome,
};
pub use economy::{
    AchievementState,
    CurrencyKind,
    EconomyCache,
    EconomyState,
    InventoryEntry,
    ItemId,
    LocalMutation,
    ServerTruth,
    Snapshot,
    ValidationError,
};
pub use events::{ChangeEvent, ChangeNotifier, ChangePhase, ResourceChange};
pub use gateway::{
    ClaimResponse,
    EquipResponse,
    GatewayError,
    PurchaseMethod,
    PurchaseResponse,
    RejectionReason,
    RemoteGateway,
    SpendResponse,
};
pub use mirror::{InMemoryMirror, JsonFileMirror, PersistentMirror};
pub use pending::{BeginError, IdempotencyKey, PendingOperationLog, PendingOutcome};
pub use session::{EconomyConfig, EconomySession};
