//! Domain identifiers (strongly-typed IDs).
//!
//! # 識別子の種類
//! - **WorkflowExecution**: サービス側が払い出す `(workflow_id, run_id)` の組
//! - **TaskToken**: poll 応答ごとに一度だけ使える資格情報
//! - **ActivityId / TimerId**: decider が払い出す ID（`{name}-{ULID}`）
//!
//! ## Phantom Type パターン
//! `ScopedId<T>` の `T` は実行時には使わないマーカー型で、
//! ActivityId と TimerId をコンパイル時に区別します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// The identity of one run of a workflow.
///
/// Created by the orchestration service when a run starts; the core only
/// ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.run_id)
    }
}

/// Opaque, single-use credential issued by one poll response.
///
/// Deliberately neither `Clone` nor `Copy`: every respond call takes the token
/// by value, so a token can be redeemed at most once. Dropping it leaves the
/// task to the service's own timeout.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TaskToken(String);

impl TaskToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログに出す ID の種類（例: "activity", "timer"）
    fn kind() -> &'static str;
}

/// An identifier scoped by a human-readable name, e.g. `loadData-01J...`.
///
/// The ULID suffix makes ids unique even when the same name is issued many
/// times within one second.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedId<T: IdMarker> {
    scope: String,
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> ScopedId<T> {
    pub fn new(scope: impl Into<String>, ulid: Ulid) -> Self {
        Self {
            scope: scope.into(),
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    pub fn kind(&self) -> &'static str {
        T::kind()
    }
}

impl<T: IdMarker> fmt::Display for ScopedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scope, self.ulid)
    }
}

/// Activity のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {}

impl IdMarker for Activity {
    fn kind() -> &'static str {
        "activity"
    }
}

/// Timer のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {}

impl IdMarker for Timer {
    fn kind() -> &'static str {
        "timer"
    }
}

/// Identifier of one scheduled activity task.
pub type ActivityId = ScopedId<Activity>;

/// Identifier of one started timer.
pub type TimerId = ScopedId<Timer>;
