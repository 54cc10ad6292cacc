//! 退避策略
//!
//! 根据连续失败次数计算目标再次可被检测前的冷却时间，
//! 同时定义存储侧资格查询使用的判定条件和排序

use crate::health::result::CheckTarget;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::cmp::Ordering;

/// 基础冷却时间（分钟）
pub const BASE_MINUTES: u64 = 30;
/// 指数上限，倍数在 2^5 = 32 处饱和
pub const CAP_EXPONENT: u32 = 5;
/// 最长冷却时间（分钟）
pub const MAX_MINUTES: u64 = 24 * 60;

/// 退避策略参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// 基础冷却时间（分钟）
    pub base_minutes: u64,
    /// 指数上限
    pub cap_exponent: u32,
    /// 最长冷却时间（分钟）
    pub max_minutes: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_minutes: BASE_MINUTES,
            cap_exponent: CAP_EXPONENT,
            max_minutes: MAX_MINUTES,
        }
    }
}

impl BackoffPolicy {
    /// 计算所需冷却时间（分钟）
    ///
    /// 失败次数达到指数上限后直接使用最长冷却时间
    pub fn required_cooldown_minutes(&self, fail_count: u32) -> u64 {
        if fail_count >= self.cap_exponent {
            return self.max_minutes;
        }
        let multiplier = 1u64.checked_shl(fail_count).unwrap_or(u64::MAX);
        self.base_minutes
            .saturating_mul(multiplier)
            .min(self.max_minutes)
    }

    /// 目标在 `now` 时刻是否可以再次检测
    ///
    /// 从未检测过的目标总是可检测
    pub fn is_eligible(&self, target: &CheckTarget, now: DateTime<Utc>) -> bool {
        match target.last_checked_at {
            None => true,
            Some(last_checked_at) => {
                let cooldown = self.required_cooldown_minutes(target.fail_count);
                now.signed_duration_since(last_checked_at)
                    >= ChronoDuration::minutes(cooldown as i64)
            }
        }
    }

    /// 目标下一次可检测的时间（从未检测过则为None）
    pub fn next_eligible_at(&self, target: &CheckTarget) -> Option<DateTime<Utc>> {
        target.last_checked_at.map(|last| {
            last + ChronoDuration::minutes(self.required_cooldown_minutes(target.fail_count) as i64)
        })
    }
}

/// 使用默认参数计算冷却时间
pub fn required_cooldown_minutes(fail_count: u32) -> u64 {
    BackoffPolicy::default().required_cooldown_minutes(fail_count)
}

/// 资格排序：失败次数少的优先，其次从未检测过的优先，最后最久未检测的优先
pub fn eligibility_order(a: &CheckTarget, b: &CheckTarget) -> Ordering {
    a.fail_count
        .cmp(&b.fail_count)
        .then_with(|| match (a.last_checked_at, b.last_checked_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        })
}

/// 按资格排序
pub fn sort_by_eligibility(targets: &mut [CheckTarget]) {
    targets.sort_by(eligibility_order);
}

/// 过滤出可检测的目标并按资格排序，最多返回 `limit` 个
pub fn select_eligible<'a, I>(
    policy: &BackoffPolicy,
    targets: I,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<CheckTarget>
where
    I: IntoIterator<Item = &'a CheckTarget>,
{
    let mut eligible: Vec<CheckTarget> = targets
        .into_iter()
        .filter(|target| policy.is_eligible(target, now))
        .cloned()
        .collect();
    sort_by_eligibility(&mut eligible);
    eligible.truncate(limit);
    eligible
}
