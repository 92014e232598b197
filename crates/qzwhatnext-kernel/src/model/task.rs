//! Canonical task model and creation defaults.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Task defaults applied by the factory.
pub const DEFAULT_DURATION_MIN: u32 = 30;
pub const DEFAULT_DURATION_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_RISK_SCORE: f64 = 0.3;
pub const DEFAULT_IMPACT_SCORE: f64 = 0.3;

/// Duration bounds accepted from clients (minutes).
pub const MIN_DURATION_MIN: u32 = 5;
pub const MAX_DURATION_MIN: u32 = 600;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Completed,
    Missed,
}

impl TaskStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Completed => "completed",
            TaskStatus::Missed => "missed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "open" => Some(TaskStatus::Open),
            "completed" => Some(TaskStatus::Completed),
            "missed" => Some(TaskStatus::Missed),
            _ => None,
        }
    }
}

/// Task category.
///
/// Legacy codes from older imports are accepted on read and normalized:
/// `social` → `family`, `stress` → `personal`, `other` → `unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Work,
    Child,
    #[serde(alias = "social")]
    Family,
    Health,
    #[serde(alias = "stress")]
    Personal,
    Ideas,
    Home,
    Admin,
    #[serde(alias = "other")]
    Unknown,
}

impl TaskCategory {
    pub fn as_code(&self) -> &'static str {
        match self {
            TaskCategory::Work => "work",
            TaskCategory::Child => "child",
            TaskCategory::Family => "family",
            TaskCategory::Health => "health",
            TaskCategory::Personal => "personal",
            TaskCategory::Ideas => "ideas",
            TaskCategory::Home => "home",
            TaskCategory::Admin => "admin",
            TaskCategory::Unknown => "unknown",
        }
    }

    /// Parse a wire/database code, accepting legacy aliases.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "work" => Some(TaskCategory::Work),
            "child" => Some(TaskCategory::Child),
            "family" | "social" => Some(TaskCategory::Family),
            "health" => Some(TaskCategory::Health),
            "personal" | "stress" => Some(TaskCategory::Personal),
            "ideas" => Some(TaskCategory::Ideas),
            "home" => Some(TaskCategory::Home),
            "admin" => Some(TaskCategory::Admin),
            "unknown" | "other" => Some(TaskCategory::Unknown),
            _ => None,
        }
    }
}

impl Default for TaskCategory {
    fn default() -> Self {
        TaskCategory::Unknown
    }
}

/// Energy demanded by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnergyIntensity {
    Low,
    #[default]
    Medium,
    High,
}

impl EnergyIntensity {
    pub fn as_code(&self) -> &'static str {
        match self {
            EnergyIntensity::Low => "low",
            EnergyIntensity::Medium => "medium",
            EnergyIntensity::High => "high",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "low" => Some(EnergyIntensity::Low),
            "medium" => Some(EnergyIntensity::Medium),
            "high" => Some(EnergyIntensity::High),
            _ => None,
        }
    }
}

/// Earliest start and latest end a task placement must respect.
///
/// May span midnight; `end` is allowed to be up to 24h past `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexibilityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Canonical task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Source system (`api`, `recurrence`, `google_sheets`, ...).
    pub source_type: String,
    /// External id in the source system; `None` for API-created tasks.
    pub source_id: Option<String>,
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub category: TaskCategory,
    pub energy_intensity: EnergyIntensity,
    pub estimated_duration_min: u32,
    pub duration_confidence: f64,
    pub risk_score: f64,
    pub impact_score: f64,
    pub deadline: Option<DateTime<Utc>>,
    /// Lower bound on placement (date, midnight UTC).
    pub start_after: Option<NaiveDate>,
    /// Soft due date; ranked at end-of-day in the user's calendar timezone.
    pub due_by: Option<NaiveDate>,
    pub flexibility_window: Option<FlexibilityWindow>,
    /// Reserved; not consulted by the engine.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    pub ai_excluded: bool,
    pub manual_priority_locked: bool,
    pub user_locked: bool,
    pub manually_scheduled: bool,
    pub recurrence_series_id: Option<Uuid>,
    pub recurrence_occurrence_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with factory defaults.
    ///
    /// `ai_excluded` is derived from a leading `.` on the title; callers
    /// may still force it on afterwards (never off for a dotted title).
    pub fn new(
        user_id: Uuid,
        source_type: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let ai_excluded = title.starts_with('.');
        Self {
            id: Uuid::new_v4(),
            user_id,
            source_type: source_type.into(),
            source_id: None,
            title,
            notes: None,
            status: TaskStatus::Open,
            category: TaskCategory::Unknown,
            energy_intensity: EnergyIntensity::Medium,
            estimated_duration_min: DEFAULT_DURATION_MIN,
            duration_confidence: DEFAULT_DURATION_CONFIDENCE,
            risk_score: DEFAULT_RISK_SCORE,
            impact_score: DEFAULT_IMPACT_SCORE,
            deadline: None,
            start_after: None,
            due_by: None,
            flexibility_window: None,
            dependencies: Vec::new(),
            ai_excluded,
            manual_priority_locked: false,
            user_locked: false,
            manually_scheduled: false,
            recurrence_series_id: None,
            recurrence_occurrence_start: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration_min = minutes;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<DateTime<Utc>>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_start_after(mut self, start_after: Option<NaiveDate>) -> Self {
        self.start_after = start_after;
        self
    }

    pub fn with_due_by(mut self, due_by: Option<NaiveDate>) -> Self {
        self.due_by = due_by;
        self
    }

    pub fn with_flexibility_window(mut self, window: Option<FlexibilityWindow>) -> Self {
        self.flexibility_window = window;
        self
    }

    pub fn with_ai_excluded(mut self, ai_excluded: bool) -> Self {
        // A dotted title is always excluded.
        self.ai_excluded = ai_excluded || self.title.starts_with('.');
        self
    }

    pub fn with_recurrence(mut self, series_id: Uuid, occurrence_start: DateTime<Utc>) -> Self {
        self.recurrence_series_id = Some(series_id);
        self.recurrence_occurrence_start = Some(occurrence_start);
        self.source_type = "recurrence".to_string();
        self.source_id = Some(series_id.to_string());
        self
    }

    /// Whether the task is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
