//! User-facing notification text.
//!
//! Turns semantic [`Event`]s into [`Notice`]s. Each notice can carry a short
//! wellbeing tip picked by day of year, so the same tip shows all day and the
//! rotation moves on at midnight.

use chrono::{DateTime, Datelike, Utc};

use crate::events::Event;
use crate::gateway::{Notice, NoticeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub title: &'static str,
    pub body: &'static str,
}

impl Tip {
    pub fn render(&self) -> String {
        format!("{}: {}", self.title, self.body)
    }
}

static EYE_EXERCISES: [Tip; 10] = [
    Tip { title: "Slow blinks", body: "Blink slowly twenty times, holding each blink for two seconds." },
    Tip { title: "20-20-20", body: "Look at something twenty feet away for twenty seconds." },
    Tip { title: "Focus shift", body: "Alternate focus between a fingertip and a distant object ten times." },
    Tip { title: "Figure eight", body: "Trace a large figure eight with your eyes five times." },
    Tip { title: "Look around", body: "Look up, down, left and right for three seconds each, head still." },
    Tip { title: "Eye circles", body: "Roll your eyes in five slow circles each way." },
    Tip { title: "Near and far", body: "Switch between your thumb at arm's length and the horizon." },
    Tip { title: "Palming", body: "Cover closed eyes with warm palms for thirty seconds and breathe." },
    Tip { title: "Quick blinks", body: "Blink quickly ten times to refresh your eyes." },
    Tip { title: "Eyes closed", body: "Close your eyes and take five deep breaths." },
];

static PHYSICAL_ACTIVITIES: [Tip; 10] = [
    Tip { title: "Walk", body: "Take a five to ten minute walk." },
    Tip { title: "Stretch", body: "Stretch your neck, shoulders and back for five minutes." },
    Tip { title: "Move fast", body: "Two minutes of jumping jacks or high knees." },
    Tip { title: "Play", body: "Play catch or juggle for a few minutes." },
    Tip { title: "Bodyweight", body: "Ten push-ups, fifteen squats or a thirty second plank." },
    Tip { title: "Outside", body: "Step outside for five minutes of fresh air." },
    Tip { title: "Dance", body: "Dance to one favourite song." },
    Tip { title: "Breathe", body: "Five minutes of slow breathing." },
    Tip { title: "Tidy up", body: "Clear your desk or water the plants." },
    Tip { title: "Call someone", body: "Ring a friend for a short chat." },
];

static MOTIVATIONS: [Tip; 10] = [
    Tip { title: "Reflect", body: "Spend a few minutes thinking about what you want today." },
    Tip { title: "Rest your mind", body: "Quiet breathing is a break your brain will thank you for." },
    Tip { title: "Wander", body: "Let your thoughts drift; ideas show up when the screen is off." },
    Tip { title: "Real world", body: "There is a lot going on beyond the screen." },
    Tip { title: "Willpower", body: "Every break you take is a small win." },
    Tip { title: "Focus", body: "Screen breaks sharpen focus for everything else." },
    Tip { title: "Balance", body: "You are building a healthier balance with your devices." },
    Tip { title: "Be present", body: "Enjoy the moment without notifications." },
    Tip { title: "Calm", body: "Take a quiet moment for yourself." },
    Tip { title: "Momentum", body: "Short breaks keep you productive. Keep going." },
];

fn rotate(tips: &'static [Tip], day_of_year: u32, offset: u32) -> &'static Tip {
    let idx = (day_of_year as usize + offset as usize) % tips.len();
    &tips[idx]
}

pub fn eye_exercise(day_of_year: u32) -> &'static Tip {
    rotate(&EYE_EXERCISES, day_of_year, 0)
}

pub fn physical_activity(day_of_year: u32) -> &'static Tip {
    rotate(&PHYSICAL_ACTIVITIES, day_of_year, 5)
}

pub fn motivation(day_of_year: u32) -> &'static Tip {
    rotate(&MOTIVATIONS, day_of_year, 10)
}

/// Format whole seconds as `1h 5m`, `5m` or `45s`.
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m")
    } else {
        format!("{seconds}s")
    }
}

/// Which notices the user wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoticeOptions {
    pub enabled: bool,
    pub welcome: bool,
    pub wellbeing_tips: bool,
}

impl Default for NoticeOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            welcome: true,
            wellbeing_tips: true,
        }
    }
}

/// Render an event, or `None` for events that have no user-facing notice.
///
/// A degraded presentation is always rendered: the notice is then the only
/// sign of the block.
pub fn notice_for(event: &Event, opts: NoticeOptions) -> Option<Notice> {
    if !opts.enabled && !matches!(event, Event::PresentationDegraded { .. }) {
        return None;
    }
    let tip = |at: &DateTime<Utc>, pick: fn(u32) -> &'static Tip| {
        opts.wellbeing_tips.then(|| pick(at.ordinal()).render())
    };

    match event {
        Event::Welcome {
            package_id,
            limit_seconds,
            at,
        } if opts.welcome => {
            let limit = format_duration(*limit_seconds);
            Some(Notice {
                kind: NoticeKind::Welcome,
                package_id: Some(package_id.clone()),
                title: format!("{package_id} - Timer active"),
                body: format!("Time limit: {limit}. This app will be blocked after {limit}."),
                tip: tip(at, motivation),
            })
        }
        Event::Milestone {
            package_id,
            percent,
            remaining_seconds,
            at,
            ..
        } => {
            let pick: fn(u32) -> &'static Tip = match percent {
                30 => eye_exercise,
                70 => physical_activity,
                _ => motivation,
            };
            Some(Notice {
                kind: NoticeKind::Milestone,
                package_id: Some(package_id.clone()),
                title: format!("{package_id} - {percent}% time used"),
                body: format!("{} remaining", format_duration(*remaining_seconds)),
                tip: tip(at, pick),
            })
        }
        Event::Blocked {
            package_id,
            limit_seconds,
            at,
            ..
        } => Some(Notice {
            kind: NoticeKind::Blocked,
            package_id: Some(package_id.clone()),
            title: format!("{package_id} - BLOCKED"),
            body: format!(
                "Time limit ({}) has expired.",
                format_duration(*limit_seconds)
            ),
            tip: tip(at, physical_activity),
        }),
        Event::PresentationDegraded {
            package_id, at, ..
        } => Some(Notice {
            kind: NoticeKind::Blocked,
            package_id: Some(package_id.clone()),
            title: format!("{package_id} BLOCKED"),
            body: "Time limit reached. Open wellguard to manage limits.".to_string(),
            tip: tip(at, physical_activity),
        }),
        _ => None,
    }
}

/// Text of the persistent "monitoring active" notice.
pub fn status_notice(tracked: usize, blocked: usize) -> Notice {
    let body = if blocked > 0 {
        format!("{tracked} app timers running, {blocked} blocked")
    } else {
        format!("{tracked} app timers running")
    };
    Notice {
        kind: NoticeKind::Status,
        package_id: None,
        title: "Digital wellbeing active".to_string(),
        body,
        tip: None,
    }
}
