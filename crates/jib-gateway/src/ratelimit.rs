use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding window length.
pub const WINDOW: Duration = Duration::from_secs(3600);

/// Hard ceiling for the combined class. Limits stay well below GitHub's
/// 5000/h authenticated ceiling with headroom; env overrides cannot raise
/// this cap.
const COMBINED_CAP: usize = 4000;

const COMBINED_KEY: &str = "combined";

/// Operation classes tracked by the rate limiter, one per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    GitPush,
    GitFetch,
    GhPrCreate,
    GhPrComment,
    GhPrEdit,
    GhPrClose,
    GhExecute,
}

impl OpClass {
    pub const ALL: [OpClass; 7] = [
        OpClass::GitPush,
        OpClass::GitFetch,
        OpClass::GhPrCreate,
        OpClass::GhPrComment,
        OpClass::GhPrEdit,
        OpClass::GhPrClose,
        OpClass::GhExecute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OpClass::GitPush => "git_push",
            OpClass::GitFetch => "git_fetch",
            OpClass::GhPrCreate => "gh_pr_create",
            OpClass::GhPrComment => "gh_pr_comment",
            OpClass::GhPrEdit => "gh_pr_edit",
            OpClass::GhPrClose => "gh_pr_close",
            OpClass::GhExecute => "gh_execute",
        }
    }

    fn default_limit(self) -> usize {
        match self {
            OpClass::GitPush => 1000,
            OpClass::GitFetch => 2000,
            OpClass::GhPrCreate => 500,
            OpClass::GhPrComment => 2000,
            OpClass::GhPrEdit => 500,
            OpClass::GhPrClose => 500,
            OpClass::GhExecute => 2000,
        }
    }

    fn env_var(self) -> String {
        format!("JIB_RATE_LIMIT_{}", self.as_str().to_uppercase())
    }
}

/// Per-class hourly limits plus the combined cap.
#[derive(Debug, Clone)]
pub struct RateLimits {
    per_class: HashMap<OpClass, usize>,
    combined: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_class: OpClass::ALL
                .into_iter()
                .map(|class| (class, class.default_limit()))
                .collect(),
            combined: COMBINED_CAP,
        }
    }
}

impl RateLimits {
    /// Defaults with `JIB_RATE_LIMIT_<CLASS>` env overrides applied.
    ///
    /// Every limit, including the combined one, is clamped to the combined
    /// cap: an override can tighten the gateway but never push it past the
    /// GitHub headroom budget.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(combined) = read_limit("JIB_RATE_LIMIT_COMBINED") {
            limits.combined = combined.min(COMBINED_CAP);
        }
        for class in OpClass::ALL {
            if let Some(limit) = read_limit(&class.env_var()) {
                limits.per_class.insert(class, limit.min(limits.combined));
            }
        }
        limits
    }

    pub fn with_limit(mut self, class: OpClass, limit: usize) -> Self {
        self.per_class.insert(class, limit.min(self.combined));
        self
    }

    pub fn with_combined(mut self, combined: usize) -> Self {
        self.combined = combined.min(COMBINED_CAP);
        self
    }

    fn limit_for(&self, class: OpClass) -> usize {
        self.per_class
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_limit())
    }
}

fn read_limit(var: &str) -> Option<usize> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => Some(limit),
        _ => {
            tracing::warn!(var, value = %raw, "ignoring invalid rate limit override");
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitExceeded {
    #[error("Rate limit exceeded for {class}: {count}/{limit} per hour")]
    Class {
        class: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("Combined rate limit exceeded: {count}/{limit} per hour")]
    Combined { count: usize, limit: usize },
}

/// In-memory sliding-window counters, one per operation class plus the
/// combined safety cap.
///
/// A request is recorded against its class and the combined window on exactly
/// the same events; a denial records nothing. One lock covers both windows,
/// which also fixes the class-then-combined evaluation order.
pub struct RateLimiter {
    limits: RateLimits,
    windows: Mutex<HashMap<&'static str, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request against `class`, denying when either the class or the
    /// combined window is full.
    pub fn check_and_record(&self, class: OpClass) -> Result<(), RateLimitExceeded> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let class_count = prune_and_count(windows.entry(class.as_str()).or_default());
        let class_limit = self.limits.limit_for(class);
        if class_count >= class_limit {
            return Err(RateLimitExceeded::Class {
                class: class.as_str(),
                count: class_count,
                limit: class_limit,
            });
        }

        let combined_count = prune_and_count(windows.entry(COMBINED_KEY).or_default());
        if combined_count >= self.limits.combined {
            return Err(RateLimitExceeded::Combined {
                count: combined_count,
                limit: self.limits.combined,
            });
        }

        let now = Instant::now();
        windows.entry(class.as_str()).or_default().push(now);
        windows.entry(COMBINED_KEY).or_default().push(now);
        Ok(())
    }
}

fn prune_and_count(window: &mut Vec<Instant>) -> usize {
    window.retain(|t| t.elapsed() < WINDOW);
    window.len()
}
