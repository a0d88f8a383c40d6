//! A [`Timeline`] is the chronological feed of everything that happened to the
//! SWMS records of a site.
//!
//! The events come from three independently stored sources that share no
//! common shape: the submissions themselves, the change-log and the
//! notification audit log. Callers convert each source into [`Event`]s and
//! hand the three lists to [`Timeline::merge`], which produces one ordered
//! list.
//!
//! Ordering is most recent first. Events with equal timestamps keep the order
//! of their source (submissions, change-log, notifications), and within a
//! source the order in which they were provided, so merging the same input
//! twice always produces the same feed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{error, fmt};

/// The coarse grouping used to filter a timeline.
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Submission lifecycle events.
    Submissions,

    /// Campaign notifications and other notification audits.
    Emails,

    /// Raw change-log entries.
    Audits,
}

/// Which events to keep when filtering a timeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Filter {
    /// Keep every event.
    All,

    /// Keep only events of one category.
    Only(Category),
}

impl Filter {
    /// Returns `true` if the event passes the filter.
    pub fn matches(self, event: &Event) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(category) => event.category == category,
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl FromStr for Filter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Filter::All),
            "submissions" => Ok(Filter::Only(Category::Submissions)),
            "emails" => Ok(Filter::Only(Category::Emails)),
            "audits" => Ok(Filter::Only(Category::Audits)),
            other => Err(UnknownFilter(other.to_owned())),
        }
    }
}

/// Returned when parsing an unknown filter name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownFilter(pub String);

impl fmt::Display for UnknownFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown timeline filter: {}", self.0)
    }
}

impl error::Error for UnknownFilter {}

/// The outcome shown next to an event.
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The event records something that went well.
    Success,

    /// The event records a failure or a rejection.
    Failure,

    /// The event records something still waiting on someone.
    Pending,

    /// Neutral, informational event.
    Info,
}

/// A single entry in the timeline.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// A machine readable tag, such as `submission_approved`.
    pub kind: String,

    /// The category this event is filtered by.
    pub category: Category,

    /// Short, human readable title.
    pub title: String,

    /// Longer, human readable description.
    pub description: String,

    /// When the event happened.
    pub timestamp: DateTime<Utc>,

    /// The contractor involved, if any.
    pub contractor_id: Option<String>,

    /// The outcome shown next to the event.
    pub status: Outcome,
}

impl Event {
    /// The timestamp formatted as an RFC 3339 (ISO 8601) string, with
    /// millisecond precision.
    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// An ordered list of events, most recent first.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    events: Vec<Event>,
}

impl Timeline {
    /// Merge the three event sources into a single timeline.
    ///
    /// The sources are concatenated in argument order, after which a stable
    /// sort on the timestamp (descending) takes care of the rest.
    pub fn merge(submissions: Vec<Event>, audits: Vec<Event>, notifications: Vec<Event>) -> Self {
        let mut events = submissions;
        events.extend(audits);
        events.extend(notifications);

        // `sort_by` is stable, which is what gives ties their source order.
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Self { events }
    }

    /// All events, most recent first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Iterate over the events passing `filter`.
    ///
    /// Filtering works on the already merged list, nothing is fetched again.
    pub fn filter(&self, filter: Filter) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| filter.matches(e))
    }

    /// Keep at most `limit` of the most recent events.
    pub fn truncate(&mut self, limit: usize) {
        self.events.truncate(limit)
    }

    /// The number of events in the timeline.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the timeline holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for Timeline {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
