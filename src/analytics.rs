//! Pure aggregation over raw view/click events. No I/O; everything here
//! is directly unit-testable against literal event slices.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{ClickEvent, ViewEvent};

pub const DEFAULT_TOP_LINKS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DayCount {
    /// Calendar date, `YYYY-MM-DD` (UTC).
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeviceCount {
    pub device: DeviceClass,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HourCount {
    /// Hour of day, 0..=23.
    pub hour: u8,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LinkCount {
    pub url: String,
    pub clicks: u64,
}

/// Group timestamps by calendar date, ascending. Days with zero events do
/// not appear in the output.
pub fn bucket_by_day(times: &[DateTime<Utc>]) -> Vec<DayCount> {
    let mut by_day: std::collections::BTreeMap<String, u64> = Default::default();
    for t in times {
        *by_day.entry(t.format("%Y-%m-%d").to_string()).or_insert(0) += 1;
    }
    by_day.into_iter().map(|(date, count)| DayCount { date, count }).collect()
}

fn classify_device(user_agent: Option<&str>) -> DeviceClass {
    let ua = match user_agent {
        Some(ua) if !ua.is_empty() => ua.to_ascii_lowercase(),
        _ => return DeviceClass::Desktop,
    };
    if ua.contains("mobile") {
        DeviceClass::Mobile
    } else if ua.contains("tablet") {
        DeviceClass::Tablet
    } else {
        DeviceClass::Desktop
    }
}

/// Classify views by user-agent substring match ("mobile" wins over
/// "tablet"); missing or empty user-agents count as desktop. Classes with
/// zero views are omitted.
pub fn device_breakdown(views: &[ViewEvent]) -> Vec<DeviceCount> {
    let mut counts = [0u64; 3];
    for v in views {
        match classify_device(v.user_agent.as_deref()) {
            DeviceClass::Desktop => counts[0] += 1,
            DeviceClass::Mobile => counts[1] += 1,
            DeviceClass::Tablet => counts[2] += 1,
        }
    }
    [DeviceClass::Desktop, DeviceClass::Mobile, DeviceClass::Tablet]
        .into_iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|(device, count)| DeviceCount { device, count })
        .collect()
}

/// Hour-of-day histogram, ascending by hour; zero hours are omitted.
pub fn hour_histogram(views: &[ViewEvent]) -> Vec<HourCount> {
    let mut counts = [0u64; 24];
    for v in views {
        counts[v.viewed_at.hour() as usize] += 1;
    }
    counts
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        .map(|(hour, n)| HourCount { hour: hour as u8, count: *n })
        .collect()
}

/// Top clicked URLs: aggregate by url first, then stable-sort descending by
/// count so ties keep first-encountered order, then truncate to `n`.
/// Clicks without a stored URL are grouped under "Unknown".
pub fn top_links(clicks: &[ClickEvent], n: usize) -> Vec<LinkCount> {
    let mut agg: Vec<LinkCount> = Vec::new();
    for c in clicks {
        let url = c.link_url.as_deref().unwrap_or("Unknown");
        match agg.iter_mut().find(|e| e.url == url) {
            Some(entry) => entry.clicks += 1,
            None => agg.push(LinkCount { url: url.to_string(), clicks: 1 }),
        }
    }
    agg.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    agg.truncate(n);
    agg
}

/// Distinct non-empty visitor hashes.
pub fn unique_visitors(views: &[ViewEvent]) -> usize {
    views
        .iter()
        .filter_map(|v| v.ip_hash.as_deref())
        .filter(|h| !h.is_empty())
        .collect::<std::collections::HashSet<_>>()
        .len()
}

/// Clicks as a percentage of views, rounded to one decimal place.
/// Zero views yields 0.0, never NaN.
pub fn click_through_rate(total_views: u64, total_clicks: u64) -> f64 {
    if total_views == 0 {
        return 0.0;
    }
    let pct = total_clicks as f64 / total_views as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Display-ready bundle for the analytics endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyticsSummary {
    pub total_views: u64,
    pub total_clicks: u64,
    pub unique_visitors: usize,
    pub click_through_rate: f64,
    pub views_by_day: Vec<DayCount>,
    pub clicks_by_day: Vec<DayCount>,
    pub device_breakdown: Vec<DeviceCount>,
    pub hour_histogram: Vec<HourCount>,
    pub top_links: Vec<LinkCount>,
}

impl AnalyticsSummary {
    pub fn compute(
        views: &[ViewEvent],
        clicks: &[ClickEvent],
        total_views: u64,
        total_clicks: u64,
        top_n: usize,
    ) -> Self {
        let view_times: Vec<_> = views.iter().map(|v| v.viewed_at).collect();
        let click_times: Vec<_> = clicks.iter().map(|c| c.clicked_at).collect();
        AnalyticsSummary {
            total_views,
            total_clicks,
            unique_visitors: unique_visitors(views),
            click_through_rate: click_through_rate(total_views, total_clicks),
            views_by_day: bucket_by_day(&view_times),
            clicks_by_day: bucket_by_day(&click_times),
            device_breakdown: device_breakdown(views),
            hour_histogram: hour_histogram(views),
            top_links: top_links(clicks, top_n),
        }
    }
}
