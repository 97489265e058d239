//! IdGenerator port - ID 生成の抽象化
//!
//! ScheduleActivity / StartTimer の ID を払い出します。
//! 分単位のタイムスタンプでは 1 分以内に同名の ID が衝突するため、
//! `{name}-{ULID}` 形式を使います。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::{ActivityId, TimerId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は一意な ActivityId / TimerId を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（並行に動く decision unit から共有される）
pub trait IdGenerator: Send + Sync {
    fn activity_id(&self, name: &str) -> ActivityId;

    fn timer_id(&self, name: &str) -> TimerId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を使うと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn activity_id(&self, name: &str) -> ActivityId {
        ActivityId::new(name, self.next_ulid())
    }

    fn timer_id(&self, name: &str) -> TimerId {
        TimerId::new(name, self.next_ulid())
    }
}
