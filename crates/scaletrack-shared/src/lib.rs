use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  NaiveDate,
  NaiveTime,
  Utc
};
use serde::de::Error as _;
use serde::{
  Deserialize,
  Deserializer,
  Serialize
};
use uuid::Uuid;

/// Backend table holding care tasks.
pub const TASKS_TABLE: &str = "tasks";

pub const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";
pub const DUE_TIME_FORMAT: &str =
  "%H:%M";

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
  #[must_use]
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }

  /// First eight hex digits, enough to
  /// address a task from the CLI.
  #[must_use]
  pub fn short(&self) -> String {
    self.0.simple().to_string()[..8]
      .to_string()
  }
}

impl Default for TaskId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for TaskId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl FromStr for TaskId {
  type Err = uuid::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Uuid::parse_str(s.trim()).map(Self)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl fmt::Display for OwnerId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl FromStr for OwnerId {
  type Err = uuid::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Uuid::parse_str(s.trim()).map(Self)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Pending,
  Completed,
  Overdue
}

impl TaskStatus {
  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Pending => "pending",
      | Self::Completed => "completed",
      | Self::Overdue => "overdue"
    }
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "pending" => Ok(Self::Pending),
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | "overdue" => Ok(Self::Overdue),
      | other => Err(format!(
        "unknown task status: {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  Low,
  #[default]
  Medium,
  High
}

impl FromStr for TaskPriority {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "l" | "low" => Ok(Self::Low),
      | "m" | "med" | "medium" => {
        Ok(Self::Medium)
      }
      | "h" | "high" => Ok(Self::High),
      | other => Err(format!(
        "unknown priority: {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum RelatedType {
  Enclosure,
  Hardware,
  Animal
}

impl RelatedType {
  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Enclosure => "enclosure",
      | Self::Hardware => "hardware",
      | Self::Animal => "animal"
    }
  }
}

/// What a task is about. Serialized
/// as the `related_type` and
/// `related_id` column pair, which
/// are always present together.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct RelatedRef {
  #[serde(rename = "related_type")]
  pub kind: RelatedType,
  #[serde(rename = "related_id")]
  pub id:   Uuid
}

impl FromStr for RelatedRef {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let (kind, id) =
      s.split_once(':').ok_or_else(
        || {
          format!(
            "expected KIND:UUID, got: \
             {s}"
          )
        }
      )?;
    let kind = match kind
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "enclosure" => {
        RelatedType::Enclosure
      }
      | "hardware" => {
        RelatedType::Hardware
      }
      | "animal" => RelatedType::Animal,
      | other => {
        return Err(format!(
          "unknown related type: \
           {other}"
        ));
      }
    };
    let id = Uuid::parse_str(id.trim())
      .map_err(|e| {
        format!(
          "invalid related id: {e}"
        )
      })?;
    Ok(Self { kind, id })
  }
}

/// Reads the `related_type` /
/// `related_id` pair. Both or neither
/// must be set; a half pair is an
/// error rather than `None`.
fn related_columns<'de, D>(
  deserializer: D
) -> Result<Option<RelatedRef>, D::Error>
where
  D: Deserializer<'de>
{
  #[derive(Deserialize)]
  struct Columns {
    related_type: Option<RelatedType>,
    related_id:   Option<Uuid>
  }

  let cols =
    Columns::deserialize(deserializer)?;
  match (cols.related_type, cols.related_id)
  {
    | (Some(kind), Some(id)) => {
      Ok(Some(RelatedRef { kind, id }))
    }
    | (None, None) => Ok(None),
    | (Some(_), None) => {
      Err(D::Error::custom(
        "related_type set without \
         related_id"
      ))
    }
    | (None, Some(_)) => {
      Err(D::Error::custom(
        "related_id set without \
         related_type"
      ))
    }
  }
}

/// A row of the `tasks` table as the
/// backend returns it. `due_date` and
/// `due_time` keep the column text so
/// a malformed value still reaches
/// the view.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Task {
  pub id:          TaskId,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  pub due_date:    String,
  #[serde(default)]
  pub due_time:    Option<String>,
  pub status:      TaskStatus,
  #[serde(default)]
  pub priority:    TaskPriority,
  #[serde(
    flatten,
    deserialize_with = "related_columns"
  )]
  pub related:     Option<RelatedRef>,
  pub owner:       OwnerId,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct TaskCreate {
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  pub due_date:    NaiveDate,
  #[serde(default)]
  pub due_time:    Option<NaiveTime>,
  #[serde(default)]
  pub priority:    TaskPriority,
  #[serde(default)]
  pub related:     Option<RelatedRef>
}

impl TaskCreate {
  #[must_use]
  pub fn new(
    title: impl Into<String>,
    due_date: NaiveDate
  ) -> Self {
    Self {
      title: title.into(),
      description: None,
      due_date,
      due_time: None,
      priority: TaskPriority::default(),
      related: None
    }
  }

  /// Table constraints every backend
  /// enforces on insert.
  pub fn validate(
    &self
  ) -> Result<(), String> {
    if self.title.trim().is_empty() {
      return Err(
        "title must not be empty"
          .to_string()
      );
    }
    Ok(())
  }

  /// Builds the stored row, assigning
  /// the id and both timestamps.
  #[must_use]
  pub fn into_task(
    self,
    owner: OwnerId,
    now: DateTime<Utc>
  ) -> Task {
    Task {
      id: TaskId::new(),
      title: self.title.trim().to_string(),
      description: self
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty()),
      due_date: self
        .due_date
        .format(DUE_DATE_FORMAT)
        .to_string(),
      due_time: self.due_time.map(|t| {
        t.format(DUE_TIME_FORMAT)
          .to_string()
      }),
      status: TaskStatus::Pending,
      priority: self.priority,
      related: self.related,
      owner,
      created_at: now,
      updated_at: now
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete
}

/// A realtime notification that some
/// row of `table` changed.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct ChangeEvent {
  pub table: String,
  pub kind:  ChangeKind,
  pub at:    DateTime<Utc>
}

impl ChangeEvent {
  #[must_use]
  pub fn tasks(
    kind: ChangeKind,
    at: DateTime<Utc>
  ) -> Self {
    Self {
      table: TASKS_TABLE.to_string(),
      kind,
      at
    }
  }
}

/// What a view renders: the upcoming
/// tasks and whether a reload is in
/// flight.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct TaskSnapshot {
  pub tasks:      Vec<Task>,
  pub is_loading: bool
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveTime,
    TimeZone,
    Utc
  };
  use uuid::Uuid;

  use super::*;

  fn owner() -> OwnerId {
    OwnerId(Uuid::new_v4())
  }

  #[test]
  fn related_pair_serializes_as_flat_columns()
   {
    let enclosure = Uuid::new_v4();
    let mut input = TaskCreate::new(
      "Mist vivarium",
      NaiveDate::from_ymd_opt(
        2024, 3, 1
      )
      .expect("valid date")
    );
    input.related = Some(RelatedRef {
      kind: RelatedType::Enclosure,
      id:   enclosure
    });
    let now = Utc
      .with_ymd_and_hms(
        2024, 2, 28, 8, 0, 0
      )
      .single()
      .expect("valid now");
    let task =
      input.into_task(owner(), now);

    let value =
      serde_json::to_value(&task)
        .expect("serialize task");
    assert_eq!(
      value["related_type"],
      "enclosure"
    );
    assert_eq!(
      value["related_id"],
      enclosure.to_string()
    );
    assert_eq!(value["status"], "pending");

    let back: Task =
      serde_json::from_value(value)
        .expect("deserialize task");
    assert_eq!(back, task);
  }

  #[test]
  fn missing_related_columns_read_as_none()
   {
    let raw = serde_json::json!({
      "id": Uuid::new_v4(),
      "title": "Replace UVB bulb",
      "due_date": "2024-03-01",
      "status": "pending",
      "priority": "high",
      "owner": Uuid::new_v4(),
      "created_at": "2024-02-01T00:00:00Z",
      "updated_at": "2024-02-01T00:00:00Z"
    });
    let task: Task =
      serde_json::from_value(raw)
        .expect("deserialize task");
    assert!(task.related.is_none());
    assert!(task.due_time.is_none());
    assert_eq!(
      task.priority,
      TaskPriority::High
    );
  }

  #[test]
  fn half_related_pair_is_rejected() {
    let raw = serde_json::json!({
      "id": Uuid::new_v4(),
      "title": "Check basking lamp",
      "due_date": "2024-03-01",
      "status": "pending",
      "related_type": "animal",
      "owner": Uuid::new_v4(),
      "created_at": "2024-02-01T00:00:00Z",
      "updated_at": "2024-02-01T00:00:00Z"
    });
    let err =
      serde_json::from_value::<Task>(raw)
        .expect_err("half pair");
    assert!(
      err
        .to_string()
        .contains("without related_id")
    );
  }

  #[test]
  fn into_task_formats_date_and_time() {
    let mut input = TaskCreate::new(
      "  Feed ball python  ",
      NaiveDate::from_ymd_opt(
        2024, 3, 2
      )
      .expect("valid date")
    );
    input.due_time =
      NaiveTime::from_hms_opt(9, 5, 0);
    input.description =
      Some("   ".to_string());
    let now = Utc::now();
    let task =
      input.into_task(owner(), now);

    assert_eq!(task.title, "Feed ball python");
    assert_eq!(task.due_date, "2024-03-02");
    assert_eq!(
      task.due_time.as_deref(),
      Some("09:05")
    );
    assert!(task.description.is_none());
    assert_eq!(task.created_at, now);
    assert_eq!(task.updated_at, now);
  }

  #[test]
  fn blank_title_violates_constraint() {
    let input = TaskCreate::new(
      "   ",
      NaiveDate::from_ymd_opt(
        2024, 3, 2
      )
      .expect("valid date")
    );
    assert!(input.validate().is_err());
  }

  #[test]
  fn related_ref_parses_kind_and_id() {
    let id = Uuid::new_v4();
    let parsed: RelatedRef =
      format!("Animal:{id}")
        .parse()
        .expect("parse related");
    assert_eq!(
      parsed.kind,
      RelatedType::Animal
    );
    assert_eq!(parsed.id, id);
    assert!(
      "terrarium:abc"
        .parse::<RelatedRef>()
        .is_err()
    );
  }
}
