use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Status of one attendance day. Stored as its kebab-case name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    #[serde(alias = "on-time")]
    Present,
    SlightlyLate,
    Late,
    VeryLate,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::SlightlyLate => "slightly-late",
            AttendanceStatus::Late => "late",
            AttendanceStatus::VeryLate => "very-late",
            AttendanceStatus::Absent => "absent",
        }
    }

    /// Statuses that count toward a streak.
    pub fn is_attended(&self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }

    pub fn is_late(&self) -> bool {
        matches!(
            self,
            AttendanceStatus::SlightlyLate | AttendanceStatus::Late | AttendanceStatus::VeryLate
        )
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" | "on-time" => Ok(AttendanceStatus::Present),
            "slightly-late" => Ok(AttendanceStatus::SlightlyLate),
            "late" => Ok(AttendanceStatus::Late),
            "very-late" => Ok(AttendanceStatus::VeryLate),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(UnknownVariant {
                kind: "attendance status",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of leave requests and attendance corrections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(UnknownVariant {
                kind: "approval status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Morning,
    Evening,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Morning => "morning",
            ReportKind::Evening => "evening",
        }
    }
}

impl FromStr for ReportKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(ReportKind::Morning),
            "evening" => Ok(ReportKind::Evening),
            other => Err(UnknownVariant {
                kind: "report kind",
                value: other.to_string(),
            }),
        }
    }
}

/// The scheduled batch jobs. The kebab-case name is what lands in `job_runs.job`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    AutoLogout,
    DailyProcessing,
    WeeklySummary,
    MonthlyRewards,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AutoLogout => "auto-logout",
            JobKind::DailyProcessing => "daily-processing",
            JobKind::WeeklySummary => "weekly-summary",
            JobKind::MonthlyRewards => "monthly-rewards",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto-logout" => Ok(JobKind::AutoLogout),
            "daily-processing" => Ok(JobKind::DailyProcessing),
            "weekly-summary" => Ok(JobKind::WeeklySummary),
            "monthly-rewards" => Ok(JobKind::MonthlyRewards),
            other => Err(UnknownVariant {
                kind: "job",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(UnknownVariant {
                kind: "job status",
                value: other.to_string(),
            }),
        }
    }
}
