use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const DEFAULT_TIMEZONE: &str =
  "UTC";

/// Resolves "now" and "today" in the
/// configured timezone. Due dates are
/// calendar dates, so every overdue
/// and grouping decision goes through
/// `today()`.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
  tz: Tz
}

impl Clock {
  #[must_use]
  pub fn new(tz: Tz) -> Self {
    Self { tz }
  }

  #[must_use]
  pub fn utc() -> Self {
    Self::new(chrono_tz::UTC)
  }

  pub fn from_name(
    name: &str
  ) -> anyhow::Result<Self> {
    parse_timezone(name, "config")
      .map(Self::new)
      .ok_or_else(|| {
        anyhow!(
          "unknown timezone: {name}"
        )
      })
  }

  #[must_use]
  pub fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    self.date_of(self.now())
  }

  #[must_use]
  pub fn date_of(
    &self,
    instant: DateTime<Utc>
  ) -> NaiveDate {
    instant
      .with_timezone(&self.tz)
      .date_naive()
  }
}

impl Default for Clock {
  fn default() -> Self {
    Self::utc()
  }
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a due-date expression
/// relative to `today`: `today`,
/// `tomorrow`, `yesterday`, weekday
/// and month names, `+3d` / `-1w`
/// offsets and ISO dates.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  if let Some(target_month) =
    parse_month_name(&lower)
  {
    let mut year = today.year();
    let this_year =
      NaiveDate::from_ymd_opt(
        year,
        target_month,
        1
      )
      .ok_or_else(|| {
        anyhow!(
          "invalid month value: \
           {target_month}"
        )
      })?;
    if this_year <= today {
      year = year.saturating_add(1);
    }
    return NaiveDate::from_ymd_opt(
      year,
      target_month,
      1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month/year \
         candidate"
      )
    });
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::days(num),
      | "w" => Duration::weeks(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    let shifted = if sign == "-" {
      today.checked_sub_signed(duration)
    } else {
      today.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    });
  }

  for fmt in ["%Y-%m-%d", "%Y%m%d"] {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        token, fmt
      )
    {
      return Ok(date);
    }
  }

  Err(anyhow!(
    "unrecognized due date: {token}"
  ))
}

/// Parses `14:30`, `2:30pm` or `9am`.
pub fn parse_due_time_expr(
  input: &str
) -> anyhow::Result<NaiveTime> {
  let (hour, minute) =
    parse_clock_time(input)
      .ok_or_else(|| {
        anyhow!(
          "unrecognized due time: {}",
          input.trim()
        )
      })?;
  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
  .ok_or_else(|| {
    anyhow!(
      "invalid time of day: {}",
      input.trim()
    )
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = i64::from(
    from
      .weekday()
      .num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = match captures
    .name("minute")
  {
    | Some(m) => {
      m.as_str().parse::<u32>().ok()?
    }
    | None => 0
  };
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => {
        if raw_hour == 12 {
          0
        } else {
          raw_hour
        }
      }
      | "pm" => {
        if raw_hour == 12 {
          12
        } else {
          raw_hour + 12
        }
      }
      | _ => return None
    }
  } else {
    // A bare hour is ambiguous.
    captures.name("minute")?;
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}
