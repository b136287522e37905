//! 按来源的断路器
//!
//! 一次 blocked 分类就会打开该来源的断路器，本次运行内不再恢复。

use chrono::{DateTime, Local};
use std::collections::BTreeMap;

use crate::models::{SearchTerm, SourceName};

/// 断路器打开时的记录
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerTrip {
    pub term: SearchTerm,
    pub message: String,
    pub at: DateTime<Local>,
}

/// 本次运行的全部断路器状态
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakers {
    open: BTreeMap<SourceName, BreakerTrip>,
}

impl CircuitBreakers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, source: SourceName) -> bool {
        self.open.contains_key(&source)
    }

    /// 打开断路器；已打开时保留第一次的记录，返回 false
    pub fn trip(&mut self, source: SourceName, term: &SearchTerm, message: &str) -> bool {
        if self.is_open(source) {
            return false;
        }
        self.open.insert(
            source,
            BreakerTrip {
                term: term.clone(),
                message: message.to_string(),
                at: Local::now(),
            },
        );
        true
    }

    pub fn trip_record(&self, source: SourceName) -> Option<&BreakerTrip> {
        self.open.get(&source)
    }

    /// 给定来源是否全部被封锁（空列表视为否）
    pub fn all_open<I>(&self, sources: I) -> bool
    where
        I: IntoIterator<Item = SourceName>,
    {
        let mut any = false;
        for source in sources {
            any = true;
            if !self.is_open(source) {
                return false;
            }
        }
        any
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}
