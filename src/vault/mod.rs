//! Vault module: items, the decrypted cache and the session orchestrator.
//!
//! - `item`: server records, plaintext fields and drafts
//! - `cache`: bounded TTL cache of decrypted items
//! - `session`: lifecycle phases, events and settings
//! - `store`: `VaultSession`, the only owner of an unlocked key
//! - `transfer`: JSON/CSV export and import, optionally password-sealed

pub mod cache;
pub mod item;
pub mod session;
pub mod store;
pub mod transfer;

pub use cache::DecryptedCache;
pub use item::{normalize_domain, CustomField, DecryptedItem, ItemDraft, ItemFields, ItemType, VaultItem};
pub use session::{LockReason, SessionEvent, SessionPhase, SessionSettings};
pub use store::{BatchOutcome, GetItemsOptions, ImportReport, ItemState, ListedItem, VaultSession};
pub use transfer::{ExportFormat, ExportRecord, SealedExport};
