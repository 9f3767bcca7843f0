//! The vault session orchestrator.
//!
//! `VaultSession` owns the unlocked key, the decrypted-item cache and the
//! inactivity timer for one user.  It is an explicit value: a host may
//! hold several at once (for example a second one keyed by a one-time
//! export password).  Cloning the handle shares the same session.
//!
//! All state sits behind one mutex that is never held across an
//! `.await`.  Every unlock and every lock bumps a generation counter;
//! an async operation captures the generation before it suspends and
//! refuses to publish its result if the counter moved.  A lock therefore
//! always wins over in-flight work.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{CryptoEngine, DerivedKey, EncryptOptions, KdfParams};
use crate::errors::{Result, ZkVaultError};
use crate::exchange::{self, HybridKeyPair, HybridPublicKeys, WrappedKeyEnvelope};
use crate::keystore::{wrapped_key_id, KeyStore};
use crate::transport::Transport;

use super::cache::DecryptedCache;
use super::item::{associated_data, normalize_domain, DecryptedItem, ItemDraft, ItemFields, VaultItem};
use super::session::{LockReason, Session, SessionEvent, SessionPhase, SessionSettings};
use super::transfer::{self, ExportFormat};

/// Plaintexts above this size are zstd-compressed before encryption.
const COMPRESS_THRESHOLD: usize = 512;

const EVENT_CAPACITY: usize = 16;

/// Filters and mode for [`VaultSession::get_items`].
#[derive(Debug, Clone, Default)]
pub struct GetItemsOptions {
    /// Decrypt every returned item before returning.
    pub eager_decrypt: bool,
    pub folder_id: Option<String>,
    pub favorites_only: bool,
}

/// Decryption status of a listed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    NeedsDecryption,
    Decrypted(DecryptedItem),
    /// The ciphertext failed its integrity check or did not parse.
    DecryptionFailed(String),
}

#[derive(Debug, Clone)]
pub struct ListedItem {
    pub item: VaultItem,
    pub state: ItemState,
}

/// Result of [`VaultSession::batch_decrypt`].  Per-item failures never
/// abort the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub decrypted: Vec<DecryptedItem>,
    pub failed: Vec<(String, ZkVaultError)>,
}

/// Result of [`VaultSession::import_vault`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub item_ids: Vec<String>,
}

struct State {
    phase: SessionPhase,
    session: Option<Session>,
    cache: DecryptedCache,
    generation: u64,
    watcher: Option<JoinHandle<()>>,
}

impl State {
    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(ZkVaultError::NotInitialized)
    }

    /// Enter `Authenticating` and return the generation the attempt owns.
    fn begin_auth(&mut self) -> Result<u64> {
        match self.phase {
            SessionPhase::Locked => {}
            SessionPhase::Authenticating => {
                return Err(ZkVaultError::InvalidInput("an unlock is already in progress".into()))
            }
            SessionPhase::Unlocked => {
                return Err(ZkVaultError::InvalidInput("vault is already unlocked".into()))
            }
        }
        self.phase = SessionPhase::Authenticating;
        self.generation += 1;
        Ok(self.generation)
    }

    /// Back to `Locked` after a failed attempt, unless a lock already did it.
    fn abort_auth(&mut self, generation: u64) {
        if self.generation == generation && self.phase == SessionPhase::Authenticating {
            self.phase = SessionPhase::Locked;
        }
    }

    /// Zero the key, purge the cache and stop the timer.  Returns whether
    /// there was anything to tear down.
    fn teardown(&mut self) -> bool {
        let was_active = self.phase != SessionPhase::Locked;
        if let Some(mut session) = self.session.take() {
            session.destroy();
        }
        self.cache.clear();
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.phase = SessionPhase::Locked;
        self.generation += 1;
        was_active
    }
}

struct Shared<T> {
    transport: T,
    settings: SessionSettings,
    state: Mutex<State>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T> Shared<T> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_with(&self, reason: LockReason) {
        let torn_down = self.state().teardown();
        if torn_down {
            info!(?reason, "vault locked");
            self.emit(SessionEvent::Locked { reason });
            if reason == LockReason::Timeout {
                self.emit(SessionEvent::Expired);
            }
        }
    }
}

pub struct VaultSession<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport + 'static> Clone for VaultSession<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport + 'static> VaultSession<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cache = DecryptedCache::new(settings.cache_capacity, settings.cache_ttl);
        Self {
            shared: Arc::new(Shared {
                transport,
                settings,
                state: Mutex::new(State {
                    phase: SessionPhase::Locked,
                    session: None,
                    cache,
                    generation: 0,
                    watcher: None,
                }),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.state().phase
    }

    pub fn is_unlocked(&self) -> bool {
        self.phase() == SessionPhase::Unlocked
    }

    pub fn user_id(&self) -> Option<String> {
        self.shared.state().session.as_ref().map(|s| s.user_id.clone())
    }

    /// When the current session was unlocked.  `None` while locked.
    pub fn unlocked_since(&self) -> Option<DateTime<Utc>> {
        self.shared.state().session.as_ref().map(|s| s.started_at)
    }

    /// Number of live entries in the decrypted cache.
    pub fn cached_item_count(&self) -> usize {
        let mut state = self.shared.state();
        state.cache.purge_expired();
        state.cache.len()
    }

    /// The state guard, provided the session is unlocked and not idle.
    ///
    /// An idle session found here is locked on the spot and reported as
    /// `SessionExpired`.
    fn active(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.shared.state();
        let idle = state.session()?.is_idle();
        if idle {
            drop(state);
            self.shared.lock_with(LockReason::Timeout);
            return Err(ZkVaultError::SessionExpired);
        }
        Ok(state)
    }

    /// Re-acquire the state after an `.await`, failing if a lock or a
    /// new unlock happened in between.
    fn resume(&self, generation: u64) -> Result<MutexGuard<'_, State>> {
        let state = self.shared.state();
        if state.generation != generation || state.session.is_none() {
            return Err(ZkVaultError::NotInitialized);
        }
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `Locked -> Authenticating -> Unlocked`.
    ///
    /// Unknown identifiers and rejected passwords both fail with
    /// `InvalidCredentials`.  Connectivity errors pass through.
    pub async fn unlock(&self, identifier: &str, master_password: &[u8]) -> Result<()> {
        let generation = self.shared.state().begin_auth()?;
        debug!("unlock started");

        match self.authenticate(identifier, master_password).await {
            Ok((engine, user_id)) => self.install(generation, engine, user_id),
            Err(e) => {
                self.shared.state().abort_auth(generation);
                if matches!(e, ZkVaultError::InvalidCredentials) {
                    self.shared.emit(SessionEvent::Locked {
                        reason: LockReason::AuthenticationFailed,
                    });
                }
                Err(e)
            }
        }
    }

    async fn authenticate(&self, identifier: &str, master_password: &[u8]) -> Result<(CryptoEngine, String)> {
        let transport = &self.shared.transport;
        let Some(salt) = transport.fetch_salt(identifier).await? else {
            debug!("salt lookup returned nothing");
            return Err(ZkVaultError::InvalidCredentials);
        };

        let mut engine = CryptoEngine::new(KdfParams::from(self.shared.settings.kdf));
        let auth_hash = engine.initialize_with_auth_hash(master_password, &salt.salt)?;

        if !transport.verify_auth_hash(&salt.user_id, &auth_hash).await? {
            engine.clear_keys();
            warn!("server rejected auth hash");
            return Err(ZkVaultError::InvalidCredentials);
        }
        Ok((engine, salt.user_id))
    }

    fn install(&self, generation: u64, engine: CryptoEngine, user_id: String) -> Result<()> {
        let mut state = self.shared.state();
        if state.generation != generation || state.phase != SessionPhase::Authenticating {
            // Locked while authenticating; `engine` drops and zeroes here.
            return Err(ZkVaultError::NotInitialized);
        }

        state.session = Some(Session::new(engine, user_id.clone(), self.shared.settings.timeout));
        state.phase = SessionPhase::Unlocked;
        state.cache.clear();
        state.watcher = Some(spawn_watcher(Arc::downgrade(&self.shared), generation));
        drop(state);

        info!(%user_id, "vault unlocked");
        self.shared.emit(SessionEvent::Unlocked { user_id });
        Ok(())
    }

    /// Zero the key and purge the cache.  Idempotent.
    pub fn lock(&self) {
        self.shared.lock_with(LockReason::Logout);
    }

    /// Reset the inactivity timer.  No-op while locked.
    pub fn track_activity(&self) {
        let mut state = self.shared.state();
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.is_idle() {
            drop(state);
            self.shared.lock_with(LockReason::Timeout);
            return;
        }
        session.touch();
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Encrypt and upsert an item.  The cache holds the new plaintext
    /// before this returns.
    pub async fn save_item(&self, draft: ItemDraft) -> Result<DecryptedItem> {
        if draft.fields.name.trim().is_empty() {
            return Err(ZkVaultError::InvalidInput("item name cannot be empty".into()));
        }

        let (user_id, generation, cached_created_at) = {
            let mut state = self.active()?;
            let cached = draft
                .item_id
                .as_deref()
                .and_then(|item_id| state.cache.get(item_id))
                .map(|existing| existing.created_at);
            (state.session()?.user_id.clone(), state.generation, cached)
        };

        // An update whose plaintext already left the cache asks the server.
        let created_at = match (cached_created_at, draft.item_id.as_deref()) {
            (Some(created_at), _) => created_at,
            (None, Some(item_id)) => self
                .shared
                .transport
                .get_item(&user_id, item_id)
                .await?
                .map_or_else(Utc::now, |existing| existing.created_at),
            (None, None) => Utc::now(),
        };

        let record = {
            let state = self.resume(generation)?;
            let item_id = draft
                .item_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let session = state.session()?;
            let plaintext = Zeroizing::new(
                serde_json::to_vec(&draft.fields)
                    .map_err(|e| ZkVaultError::Serialization(format!("item fields: {e}")))?,
            );
            let aad = associated_data(&item_id, draft.item_type);
            let encrypted_data = session.engine.encrypt(
                &plaintext,
                EncryptOptions {
                    compress: plaintext.len() > COMPRESS_THRESHOLD,
                    additional_data: Some(aad.as_slice()),
                },
            )?;

            let domain_hash = match draft.fields.url.as_deref().and_then(normalize_domain) {
                Some(domain) => Some(session.engine.search_key()?.domain_hash(&domain)?),
                None => None,
            };

            VaultItem {
                item_id,
                item_type: draft.item_type,
                encrypted_data,
                folder_id: draft.folder_id.clone(),
                tags: draft.tags.clone(),
                domain_hash,
                favorite: draft.favorite,
                created_at,
                updated_at: Utc::now(),
            }
        };

        let stored = self.shared.transport.upsert_item(&user_id, record).await?;

        let mut state = self.resume(generation)?;
        let decrypted = DecryptedItem::from_parts(&stored, draft.fields);
        state.cache.insert(decrypted.clone());
        debug!(item_id = %stored.item_id, "item saved");
        Ok(decrypted)
    }

    /// Fetch encrypted items from the server.
    ///
    /// Items already in the cache come back `Decrypted`; the rest are
    /// `NeedsDecryption` unless `eager_decrypt` is set.
    pub async fn get_items(&self, options: GetItemsOptions) -> Result<Vec<ListedItem>> {
        let (user_id, generation) = {
            let state = self.active()?;
            (state.session()?.user_id.clone(), state.generation)
        };

        let items = self.shared.transport.list_items(&user_id).await?;
        let items = items.into_iter().filter(|item| {
            options
                .folder_id
                .as_ref()
                .map_or(true, |folder| item.folder_id.as_ref() == Some(folder))
                && (!options.favorites_only || item.favorite)
        });

        let mut listed = Vec::new();
        for item in items {
            let state = if options.eager_decrypt {
                match self.decrypt_in(&item, Some(generation)) {
                    Ok(decrypted) => ItemState::Decrypted(decrypted),
                    Err(e) if e.is_session_level() => return Err(e),
                    Err(e) => ItemState::DecryptionFailed(e.to_string()),
                }
            } else {
                match self.cached(&item, generation)? {
                    Some(decrypted) => ItemState::Decrypted(decrypted),
                    None => ItemState::NeedsDecryption,
                }
            };
            listed.push(ListedItem { item, state });
        }
        Ok(listed)
    }

    fn cached(&self, item: &VaultItem, generation: u64) -> Result<Option<DecryptedItem>> {
        let mut state = self.resume(generation)?;
        Ok(state
            .cache
            .get(&item.item_id)
            .filter(|hit| hit.updated_at >= item.updated_at))
    }

    /// Decrypt one item, serving a fresh cache entry when there is one.
    pub fn decrypt_item(&self, item: &VaultItem) -> Result<DecryptedItem> {
        self.decrypt_in(item, None)
    }

    fn decrypt_in(&self, item: &VaultItem, generation: Option<u64>) -> Result<DecryptedItem> {
        let mut state = self.active()?;
        if generation.is_some_and(|g| g != state.generation) {
            return Err(ZkVaultError::NotInitialized);
        }

        if let Some(hit) = state.cache.get(&item.item_id) {
            if hit.updated_at >= item.updated_at {
                return Ok(hit);
            }
        }

        let fields: ItemFields = {
            let session = state.session()?;
            let plaintext = session
                .engine
                .decrypt(&item.encrypted_data, Some(item.associated_data().as_slice()))
                .inspect_err(|e| {
                    if e.is_integrity_warning() {
                        warn!(item_id = %item.item_id, "item failed its integrity check");
                    }
                })?;
            serde_json::from_slice(&plaintext)
                .map_err(|e| ZkVaultError::InvalidFormat(format!("item {}: {e}", item.item_id)))?
        };

        let decrypted = DecryptedItem::from_parts(item, fields);
        state.cache.insert(decrypted.clone());
        Ok(decrypted)
    }

    /// Decrypt in chunks, yielding to the runtime between chunks.
    ///
    /// `on_progress` receives the completed fraction after each chunk.
    /// Per-item failures are collected; a lock (or any other
    /// session-level error) aborts the whole batch.
    pub async fn batch_decrypt<F>(&self, items: &[VaultItem], mut on_progress: F) -> Result<BatchOutcome>
    where
        F: FnMut(f32) + Send,
    {
        let generation = self.active()?.generation;
        let chunk_size = self.shared.settings.batch_chunk_size.max(1);
        let total = items.len();
        let mut outcome = BatchOutcome::default();

        if total == 0 {
            on_progress(1.0);
            return Ok(outcome);
        }

        let mut done = 0usize;
        for chunk in items.chunks(chunk_size) {
            for item in chunk {
                match self.decrypt_in(item, Some(generation)) {
                    Ok(decrypted) => outcome.decrypted.push(decrypted),
                    Err(e) if e.is_session_level() => return Err(e),
                    Err(e) => outcome.failed.push((item.item_id.clone(), e)),
                }
            }
            done += chunk.len();
            on_progress(done as f32 / total as f32);
            tokio::task::yield_now().await;
        }

        debug!(
            decrypted = outcome.decrypted.len(),
            failed = outcome.failed.len(),
            "batch decrypt finished"
        );
        Ok(outcome)
    }

    /// Remove an item from the server and the cache.
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        let (user_id, generation) = {
            let state = self.active()?;
            (state.session()?.user_id.clone(), state.generation)
        };

        self.shared.transport.delete_item(&user_id, item_id).await?;

        self.resume(generation)?.cache.remove(item_id);
        debug!(item_id, "item deleted");
        Ok(())
    }

    /// Case-insensitive search over already-decrypted items.
    ///
    /// Never contacts the server and never decrypts anything.  An empty
    /// query returns every cached item.
    pub fn search_items(&self, query: &str) -> Result<Vec<DecryptedItem>> {
        let needle = query.trim().to_lowercase();
        let mut state = self.active()?;
        let mut hits: Vec<DecryptedItem> = state
            .cache
            .live_items()
            .into_iter()
            .filter(|item| needle.is_empty() || item.matches(&needle))
            .collect();
        hits.sort_by(|a, b| a.fields.name.to_lowercase().cmp(&b.fields.name.to_lowercase()));
        Ok(hits)
    }

    /// The blinded hash the server indexes for `url`, for exact-match
    /// lookups.  `None` when the URL has no usable host.
    pub fn domain_hash_for(&self, url: &str) -> Result<Option<String>> {
        let state = self.active()?;
        let Some(domain) = normalize_domain(url) else {
            return Ok(None);
        };
        let search_key = state.session()?.engine.search_key()?;
        search_key.domain_hash(&domain).map(Some)
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Wrap the session key for another device.
    pub fn pair_device(&self, peer: &HybridPublicKeys) -> Result<WrappedKeyEnvelope> {
        peer.validate()?;
        let state = self.active()?;
        let key = state.session()?.engine.key()?;
        let envelope = exchange::wrap_key(key.as_bytes(), peer)?;
        info!("vault key wrapped for a new device");
        Ok(envelope)
    }

    /// Open a session from an envelope wrapped for this device.
    ///
    /// An envelope that does not unwrap leaves the vault `Locked`.
    pub async fn unlock_with_envelope(
        &self,
        user_id: &str,
        envelope: &WrappedKeyEnvelope,
        device: &HybridKeyPair,
    ) -> Result<()> {
        let generation = self.shared.state().begin_auth()?;

        let key = exchange::unwrap_key(envelope, device).and_then(|raw| DerivedKey::from_slice(&raw));
        match key {
            Ok(key) => self.install(generation, CryptoEngine::with_key(key), user_id.to_string()),
            Err(e) => {
                self.shared.state().abort_auth(generation);
                warn!("device envelope did not unwrap");
                self.shared.emit(SessionEvent::Locked {
                    reason: LockReason::KeyUnwrapFailed,
                });
                Err(e)
            }
        }
    }

    /// Persist the session key, wrapped for `device`, so the vault can
    /// be reopened after a restart without the master password.
    pub async fn remember_device(&self, store: &dyn KeyStore, device: &HybridPublicKeys) -> Result<()> {
        let (user_id, json) = {
            let state = self.active()?;
            let session = state.session()?;
            device.validate()?;
            let envelope = exchange::wrap_key(session.engine.key()?.as_bytes(), device)?;
            (session.user_id.clone(), envelope.to_json()?)
        };
        store.store(&wrapped_key_id(&user_id), json.as_bytes()).await?;
        debug!(%user_id, "wrapped key stored for quick unlock");
        Ok(())
    }

    /// Reopen the vault from the key store.
    pub async fn unlock_with_device(
        &self,
        store: &dyn KeyStore,
        user_id: &str,
        device: &HybridKeyPair,
    ) -> Result<()> {
        let Some(bytes) = store.retrieve(&wrapped_key_id(user_id)).await? else {
            return Err(ZkVaultError::KeyStore(
                "no wrapped key is stored for this device".into(),
            ));
        };

        let envelope = std::str::from_utf8(&bytes)
            .map_err(|_| ZkVaultError::Unwrap("stored envelope is not UTF-8".into()))
            .and_then(WrappedKeyEnvelope::from_json);
        match envelope {
            Ok(envelope) => self.unlock_with_envelope(user_id, &envelope, device).await,
            Err(e) => {
                self.shared.emit(SessionEvent::Locked {
                    reason: LockReason::KeyUnwrapFailed,
                });
                Err(e)
            }
        }
    }

    /// Drop the stored wrapped key for `user_id`.
    pub async fn forget_device(&self, store: &dyn KeyStore, user_id: &str) -> Result<()> {
        store.delete(&wrapped_key_id(user_id)).await
    }

    // ------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------

    /// Serialize decrypted items, sealing them under `password` if given.
    pub fn export_vault(
        &self,
        items: &[DecryptedItem],
        format: ExportFormat,
        password: Option<&[u8]>,
    ) -> Result<String> {
        drop(self.active()?);
        let bundle = transfer::export_vault(items, format, password, &self.shared.settings.kdf)?;
        info!(count = items.len(), %format, sealed = password.is_some(), "vault exported");
        Ok(bundle)
    }

    /// Parse an export and save every record as a new item.
    pub async fn import_vault(
        &self,
        data: &str,
        format: ExportFormat,
        password: Option<&[u8]>,
    ) -> Result<ImportReport> {
        drop(self.active()?);
        let records = transfer::read_export(data, format, password)?;

        let mut report = ImportReport::default();
        for record in records {
            let saved = self.save_item(record.into_draft()?).await?;
            report.item_ids.push(saved.item_id);
            report.imported += 1;
        }
        info!(count = report.imported, "vault imported");
        Ok(report)
    }
}

/// Lock the session when its inactivity deadline passes, and drop cached
/// plaintext as each entry's TTL runs out.
///
/// Holds only a weak reference so an abandoned session is freed; exits
/// as soon as the generation it was started for is gone.
fn spawn_watcher<T: Transport + 'static>(shared: Weak<Shared<T>>, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wake = {
                let Some(shared) = shared.upgrade() else { return };
                let state = shared.state();
                if state.generation != generation {
                    return;
                }
                let deadline = match state.session.as_ref() {
                    Some(session) => session.deadline(),
                    None => return,
                };
                state
                    .cache
                    .next_expiry()
                    .map_or(deadline, |due| due.min(deadline))
            };

            tokio::time::sleep_until(wake).await;

            let Some(shared) = shared.upgrade() else { return };
            let idle = {
                let mut state = shared.state();
                if state.generation != generation {
                    return;
                }
                let before = state.cache.len();
                state.cache.purge_expired();
                if state.cache.len() < before {
                    debug!(purged = before - state.cache.len(), "expired cache entries dropped");
                }
                // Detach so the teardown below does not abort this task.
                let idle = state.session.as_ref().is_some_and(Session::is_idle);
                if idle {
                    state.watcher = None;
                }
                idle
            };
            if idle {
                info!("session expired after inactivity");
                shared.lock_with(LockReason::Timeout);
                return;
            }
        }
    })
}
