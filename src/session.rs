//! Session state over a key-value store.
//!
//! A session is a raw token plus an encoded JSON record, kept under two
//! fixed store keys. The record may carry expiration metadata
//! (`session_time`, `expire_at`). Expiry is detected lazily by
//! [`SessionStore::exists`]; nothing sweeps expired sessions in the
//! background.
//!
//! `exists` is a check-and-repair operation, not a pure query: it removes
//! partial state (one key without the other) and destroys expired sessions.
//! Every detail mutation goes through it.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::error::Result;
use crate::reload::{NoReload, Reload};
use crate::storage::KeyValueStore;

/// Default store key for the encoded data record.
pub const DEFAULT_DATA_KEY: &str = "__session_f0b0d9caeeac416c7f1a79195a1313c1";

/// Default store key for the raw token.
pub const DEFAULT_TOKEN_KEY: &str = "__session_0b01d74c11d6d2f5c03afc0ce733510e";

/// Record key holding the TTL in minutes set at creation.
pub const SESSION_TIME_KEY: &str = "session_time";

/// Record key holding the absolute UTC deadline.
pub const EXPIRE_AT_KEY: &str = "expire_at";

/// The pair of store keys a session lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Key for the encoded data record.
    pub data: String,
    /// Key for the raw token.
    pub token: String,
}

impl SessionKeys {
    pub fn new(data: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            token: token.into(),
        }
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_KEY, DEFAULT_TOKEN_KEY)
    }
}

/// Session manager over an injected key-value store.
///
/// Holds no session state itself; every call reads and writes the store.
/// Read-modify-write sequences are not atomic against other writers sharing
/// the same store (last write wins).
pub struct SessionStore<S: KeyValueStore> {
    store: S,
    clock: Box<dyn Clock>,
    reload: Box<dyn Reload>,
    keys: SessionKeys,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Create a session manager with the system clock, no reload hook and
    /// the default store keys.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            reload: Box::new(NoReload),
            keys: SessionKeys::default(),
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Run `reload` whenever the session is destroyed with a reload request.
    pub fn with_reload(mut self, reload: impl Reload + 'static) -> Self {
        self.reload = Box::new(reload);
        self
    }

    /// Use different store keys.
    pub fn with_keys(mut self, keys: SessionKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a new session, replacing any existing one.
    ///
    /// A `None` (or JSON `null`) record makes this a no-op: nothing is
    /// written and an existing session is left untouched. With
    /// `time_expire`, `session_time` and `expire_at` are added to the record
    /// through [`add_detail`](Self::add_detail).
    pub fn create(&self, token: &str, data: Option<Value>, time_expire: Option<i64>) -> Result<()> {
        let Some(data) = data.filter(|d| !d.is_null()) else {
            tracing::debug!("create called without session data, ignoring");
            return Ok(());
        };

        self.write_record(&data)?;
        self.store.set(&self.keys.token, token)?;

        if let Some(minutes) = time_expire {
            self.add_detail(SESSION_TIME_KEY, minutes)?;
            self.add_detail(EXPIRE_AT_KEY, self.expire_date(minutes))?;
        }

        tracing::debug!(ttl_minutes = ?time_expire, "session created");
        Ok(())
    }

    /// The decoded record, or `None` when no record is stored.
    ///
    /// Does not check the token or expiry.
    pub fn get_all(&self) -> Result<Option<Value>> {
        self.read_record()
    }

    /// The decoded record deserialized into `T`.
    pub fn get_all_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.read_record()? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    /// A single detail from the record.
    ///
    /// `None` when there is no record, the record is not an object, or the
    /// key is missing or `null`.
    pub fn get_detail(&self, key: &str) -> Result<Option<Value>> {
        let detail = match self.read_record()? {
            Some(Value::Object(mut record)) => record.remove(key),
            _ => None,
        };
        Ok(detail.filter(|v| !v.is_null()))
    }

    /// A single detail deserialized into `T`.
    pub fn get_detail_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_detail(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// The raw token. Does not validate the session.
    pub fn get_token(&self) -> Result<Option<String>> {
        self.store.get(&self.keys.token)
    }

    /// Check for an active session, repairing storage on the way.
    ///
    /// - Record or token missing: both keys are removed, returns `false`.
    /// - Deadline passed: the session is destroyed with a reload request,
    ///   returns `false`.
    /// - Otherwise `true`.
    ///
    /// A corrupt record is returned as an error.
    pub fn exists(&self) -> Result<bool> {
        let data = self.store.get(&self.keys.data)?;
        let token = self.store.get(&self.keys.token)?;

        if data.is_none() || token.is_none() {
            if data.is_some() || token.is_some() {
                tracing::warn!(
                    has_data = data.is_some(),
                    has_token = token.is_some(),
                    "removing partial session state"
                );
            }
            self.store.remove(&self.keys.data)?;
            self.store.remove(&self.keys.token)?;
            return Ok(false);
        }

        if self.is_expired()? {
            tracing::info!("session expired, destroying");
            self.destroy(true)?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Replace the token, re-arming the deadline.
    ///
    /// When the record carries both `expire_at` and `session_time`, the
    /// deadline becomes now plus the original `session_time`. The token is
    /// written even when no record exists, which leaves partial state for
    /// the next [`exists`](Self::exists) to clean up.
    pub fn update_token(&self, token: &str) -> Result<()> {
        if let Some(Value::Object(record)) = self.read_record()? {
            if record.contains_key(EXPIRE_AT_KEY) && record.contains_key(SESSION_TIME_KEY) {
                match record.get(SESSION_TIME_KEY).and_then(ttl_minutes) {
                    Some(minutes) => {
                        let ttl = TimeDelta::try_milliseconds((minutes * 60_000.0) as i64);
                        let deadline = self.expire_date_after(ttl, minutes < 0.0);
                        self.update_detail(EXPIRE_AT_KEY, deadline)?;
                    }
                    None => {
                        tracing::warn!("session_time is not a number, deadline not refreshed");
                    }
                }
            }
        }

        self.store.set(&self.keys.token, token)
    }

    /// Overwrite an existing detail. Never adds a key.
    ///
    /// No-op unless a session exists.
    pub fn update_detail(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !self.exists()? {
            return Ok(());
        }

        if let Some(Value::Object(mut record)) = self.read_record()? {
            if let Some(slot) = record.get_mut(key) {
                *slot = value.into();
                self.write_record(&Value::Object(record))?;
            }
        }
        Ok(())
    }

    /// Insert or overwrite a detail.
    ///
    /// No-op unless a session exists.
    pub fn add_detail(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !self.exists()? {
            return Ok(());
        }

        if let Some(Value::Object(mut record)) = self.read_record()? {
            record.insert(key.to_string(), value.into());
            self.write_record(&Value::Object(record))?;
        }
        Ok(())
    }

    /// Remove the record and token. Idempotent.
    ///
    /// Runs the reload hook when `reload` is true.
    pub fn destroy(&self, reload: bool) -> Result<()> {
        self.store.remove(&self.keys.data)?;
        self.store.remove(&self.keys.token)?;
        tracing::debug!(reload, "session destroyed");

        if reload {
            self.reload.reload();
        }
        Ok(())
    }

    /// The parsed `expire_at` deadline, if the record has a valid one.
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_detail(EXPIRE_AT_KEY)?
            .as_ref()
            .and_then(parse_expire_at))
    }

    /// Time left before the deadline (negative once passed).
    pub fn time_until_expiry(&self) -> Result<Option<TimeDelta>> {
        Ok(self.expires_at()?.map(|deadline| deadline - self.clock.now()))
    }

    /// Whole minutes left before the deadline, clamped at zero.
    pub fn minutes_until_expiry(&self) -> Result<Option<i64>> {
        Ok(self
            .time_until_expiry()?
            .map(|left| left.num_minutes().max(0)))
    }

    /// Whether the record's deadline has passed.
    ///
    /// Records without a deadline never expire. An unreadable deadline is
    /// treated as not expired.
    fn is_expired(&self) -> Result<bool> {
        let Some(expire_at) = self.get_detail(EXPIRE_AT_KEY)? else {
            return Ok(false);
        };

        match parse_expire_at(&expire_at) {
            Some(deadline) => Ok(deadline < self.clock.now()),
            None => {
                tracing::warn!(%expire_at, "unreadable expire_at, treating session as unexpired");
                Ok(false)
            }
        }
    }

    /// Now plus `minutes`, as an RFC 3339 UTC string with millisecond
    /// precision (`2026-01-01T12:30:00.000Z`).
    fn expire_date(&self, minutes: i64) -> String {
        self.expire_date_after(TimeDelta::try_minutes(minutes), minutes < 0)
    }

    /// Now plus `ttl`, clamped to four-digit years so the deadline always
    /// parses back. An unrepresentable `ttl` lands on the bound its sign
    /// points at.
    fn expire_date_after(&self, ttl: Option<TimeDelta>, negative: bool) -> String {
        let (earliest, latest) = (earliest_deadline(), latest_deadline());
        let deadline = ttl
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .unwrap_or(if negative { earliest } else { latest })
            .clamp(earliest, latest);
        deadline.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn read_record(&self) -> Result<Option<Value>> {
        match self.store.get(&self.keys.data)? {
            Some(stored) => Ok(Some(codec::decode(&stored)?)),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &Value) -> Result<()> {
        let encoded = codec::encode(record)?;
        self.store.set(&self.keys.data, &encoded)
    }
}

fn parse_expire_at(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|deadline| deadline.with_timezone(&Utc))
}

/// `0000-01-01T00:00:00.000Z`
fn earliest_deadline() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(-62_167_219_200_000)
}

/// `9999-12-31T23:59:59.999Z`
fn latest_deadline() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(253_402_300_799_999)
}

/// Read a stored `session_time` as (possibly fractional) minutes.
///
/// Numeric strings are accepted, since browser clients coerce them.
fn ttl_minutes(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|m| m.is_finite())
}
