//! Redis OTP repository
//!
//! Records are stored as JSON under `otp:record:<id>` and kept for a day past
//! their expiry so that late verifies still get a precise answer. A sorted set
//! per phone and purpose, scored by creation time, indexes the records for the
//! "latest" and "active" lookups. Every state change runs as a Lua script that
//! re-checks the record before writing it back. Send slots are plain keys
//! claimed with `SET NX PX`.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};
use uuid::Uuid;

use sg_core::domain::entities::{OtpPurpose, OtpRecord};
use sg_core::errors::DomainError;
use sg_core::repositories::OtpRepository;
use sg_shared::utils::phone::mask_phone_number;

use crate::cache::RedisClient;
use crate::InfrastructureError;

/// Redis key prefix for OTP records
const OTP_RECORD_PREFIX: &str = "otp:record";

/// Redis key prefix for the per phone and purpose index
const OTP_INDEX_PREFIX: &str = "otp:index";

/// Redis key prefix for per phone and purpose send slots
const OTP_SLOT_PREFIX: &str = "otp:slot";

/// How long records outlive their expiry
const RETENTION_HOURS: i64 = 24;

/// How many of the newest index entries a lookup inspects
const INDEX_SCAN_LIMIT: isize = 20;

/// Store the record and index it, refusing duplicate ids
static CREATE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
redis.call('PEXPIRE', KEYS[2], ARGV[2])
return 1
"#,
    )
});

/// Delete a send slot only while `token` still holds it
static RELEASE_SLOT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#,
    )
});

/// Conditional update of a record
///
/// ARGV[1] is the operation (`increment`, `verify` or `cancel`), ARGV[2] the
/// expected attempt count (ignored by `cancel`), ARGV[3] the verification time.
static UPDATE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local record = cjson.decode(raw)
if record.verified == true or record.cancelled == true then
    return 0
end
local op = ARGV[1]
if op ~= 'cancel' and tonumber(record.attempts) ~= tonumber(ARGV[2]) then
    return 0
end
if op == 'increment' then
    record.attempts = tonumber(record.attempts) + 1
elseif op == 'verify' then
    record.verified = true
    record.verified_at = ARGV[3]
elseif op == 'cancel' then
    record.cancelled = true
else
    return redis.error_reply('unknown operation ' .. op)
end
local encoded = cjson.encode(record)
local ttl = redis.call('PTTL', KEYS[1])
if ttl > 0 then
    redis.call('SET', KEYS[1], encoded, 'PX', ttl)
else
    redis.call('SET', KEYS[1], encoded)
end
return 1
"#,
    )
});

/// OTP repository shared by every gateway instance
pub struct RedisOtpRepository {
    client: RedisClient,
}

impl RedisOtpRepository {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn record_key(&self, id: Uuid) -> String {
        self.client
            .make_key(&format!("{}:{}", OTP_RECORD_PREFIX, id))
    }

    fn index_key(&self, phone_number: &str, purpose: OtpPurpose) -> String {
        self.client.make_key(&format!(
            "{}:{}:{}",
            OTP_INDEX_PREFIX,
            phone_number,
            purpose.as_str()
        ))
    }

    fn slot_key(&self, phone_number: &str, purpose: OtpPurpose) -> String {
        self.client.make_key(&format!(
            "{}:{}:{}",
            OTP_SLOT_PREFIX,
            phone_number,
            purpose.as_str()
        ))
    }

    /// Newest-first records indexed for phone and purpose
    async fn indexed_records(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<Vec<OtpRecord>, DomainError> {
        let index_key = self.index_key(phone_number, purpose);
        let index_key = index_key.as_str();

        let ids: Vec<String> = self
            .client
            .execute_with_retry("otp_index", move |mut conn| async move {
                conn.zrevrange::<_, Vec<String>>(index_key, 0, INDEX_SCAN_LIMIT - 1)
                    .await
            })
            .await
            .map_err(InfrastructureError::from)?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.client.make_key(&format!("{}:{}", OTP_RECORD_PREFIX, id)))
            .collect();
        let keys = &keys;

        let raw: Vec<Option<String>> = self
            .client
            .execute_with_retry("otp_mget", move |mut conn| async move {
                redis::cmd("MGET").arg(keys).query_async(&mut conn).await
            })
            .await
            .map_err(InfrastructureError::from)?;

        let mut records = Vec::with_capacity(raw.len());
        for json in raw.into_iter().flatten() {
            records.push(decode(&json)?);
        }
        // Equal scores come back in member order; restore creation order exactly
        records.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(records)
    }

    async fn update(
        &self,
        id: Uuid,
        operation: &str,
        expected_attempts: u32,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DomainError> {
        let key = self.record_key(id);
        let key = key.as_str();
        let verified_at = verified_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .unwrap_or_default();
        let verified_at = verified_at.as_str();

        let applied: i64 = self
            .client
            .execute_with_retry("otp_update", move |mut conn| async move {
                UPDATE_SCRIPT
                    .key(key)
                    .arg(operation)
                    .arg(expected_attempts)
                    .arg(verified_at)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(InfrastructureError::from)?;

        debug!(request_id = %id, operation, applied = applied == 1, "OTP record update");
        Ok(applied == 1)
    }
}

fn decode(json: &str) -> Result<OtpRecord, DomainError> {
    serde_json::from_str(json)
        .map_err(|e| InfrastructureError::Serialization(e).into())
}

#[async_trait]
impl OtpRepository for RedisOtpRepository {
    async fn create(&self, record: OtpRecord) -> Result<OtpRecord, DomainError> {
        let json = serde_json::to_string(&record).map_err(InfrastructureError::Serialization)?;
        let ttl = (record.expires_at - Utc::now()) + Duration::hours(RETENTION_HOURS);
        let ttl_ms = ttl.num_milliseconds().max(1000);

        let record_key = self.record_key(record.id);
        let index_key = self.index_key(&record.phone_number, record.purpose);
        let (record_key, index_key, json) = (record_key.as_str(), index_key.as_str(), json.as_str());
        let score = record.created_at.timestamp_millis();
        let member = record.id.to_string();
        let member = member.as_str();

        let created: i64 = self
            .client
            .execute_with_retry("otp_create", move |mut conn| async move {
                CREATE_SCRIPT
                    .key(record_key)
                    .key(index_key)
                    .arg(json)
                    .arg(ttl_ms)
                    .arg(score)
                    .arg(member)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(InfrastructureError::from)?;

        if created != 1 {
            warn!(
                request_id = %record.id,
                phone = %mask_phone_number(&record.phone_number),
                "Refusing to overwrite existing OTP record"
            );
            return Err(DomainError::Validation {
                message: format!("OTP record {} already exists", record.id),
            });
        }

        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError> {
        let json = self
            .client
            .get(&self.record_key(id))
            .await
            .map_err(InfrastructureError::from)?;
        json.as_deref().map(decode).transpose()
    }

    async fn find_active(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError> {
        Ok(self
            .indexed_records(phone_number, purpose)
            .await?
            .into_iter()
            .find(|r| r.is_active(now)))
    }

    async fn find_latest(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>, DomainError> {
        Ok(self
            .indexed_records(phone_number, purpose)
            .await?
            .into_iter()
            .next())
    }

    async fn increment_attempts(
        &self,
        id: Uuid,
        expected_attempts: u32,
    ) -> Result<bool, DomainError> {
        self.update(id, "increment", expected_attempts, None).await
    }

    async fn mark_verified(
        &self,
        id: Uuid,
        expected_attempts: u32,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        self.update(id, "verify", expected_attempts, Some(verified_at))
            .await
    }

    async fn mark_cancelled(&self, id: Uuid) -> Result<bool, DomainError> {
        self.update(id, "cancel", 0, None).await
    }

    async fn reserve_send(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        token: Uuid,
        cooldown: StdDuration,
    ) -> Result<bool, DomainError> {
        let key = self.slot_key(phone_number, purpose);
        let key = key.as_str();
        let token = token.to_string();
        let token = token.as_str();
        let cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = self
            .client
            .execute_with_retry("otp_reserve_send", move |mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(cooldown_ms)
                    .query_async(&mut conn)
                    .await
            })
            .await
            .map_err(InfrastructureError::from)?;

        Ok(reply.is_some())
    }

    async fn release_send(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
        token: Uuid,
    ) -> Result<(), DomainError> {
        let key = self.slot_key(phone_number, purpose);
        let key = key.as_str();
        let token = token.to_string();
        let token = token.as_str();

        let _: i64 = self
            .client
            .execute_with_retry("otp_release_send", move |mut conn| async move {
                RELEASE_SLOT_SCRIPT
                    .key(key)
                    .arg(token)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .map_err(InfrastructureError::from)?;

        Ok(())
    }
}
