//! Multi-day schedule aggregation over a [`ListingsPort`].

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::fragment::FragmentParser;
use crate::model::{AccessToken, ProgramEntry, ScheduleDay, sort_by_start};
use crate::ports::{ListingsPort, PortError};

/// Collects the injected channel's programmes across the listing window.
pub struct ScheduleAggregator {
    listings: Arc<dyn ListingsPort>,
    parser: FragmentParser,
}

impl ScheduleAggregator {
    /// Create an aggregator reading from `listings`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Selector`] if the slot parser cannot be built.
    pub fn new(listings: Arc<dyn ListingsPort>) -> Result<Self, PortError> {
        Ok(Self {
            listings,
            parser: FragmentParser::new()?,
        })
    }

    /// Fetch and parse every day of `days`, returning all programmes sorted by start.
    ///
    /// Days are fetched concurrently but concatenated in window order, page results
    /// before AJAX results, before the stable sort. Any failure aborts the whole run.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Authentication`] if no token is granted, or the first
    /// network/decode error raised by any day.
    pub async fn fetch_all_programs(
        &self,
        days: &[ScheduleDay],
    ) -> Result<Vec<ProgramEntry>, PortError> {
        let token = self.listings.access_token().await?;
        info!("listing access token acquired");

        let per_day = try_join_all(days.iter().map(|day| self.fetch_day(day, &token))).await?;

        let mut programs: Vec<ProgramEntry> = per_day.into_iter().flatten().collect();
        sort_by_start(&mut programs);

        info!(count = programs.len(), days = days.len(), "aggregated listing programmes");
        Ok(programs)
    }

    async fn fetch_day(
        &self,
        day: &ScheduleDay,
        token: &AccessToken,
    ) -> Result<Vec<ProgramEntry>, PortError> {
        let page = self.listings.day_page(day).await?;
        let mut programs = self.parser.parse_programs(&page, day.date);
        let from_page = programs.len();

        let fragments = self.listings.day_fragments(day, token).await?;
        debug!(date = %day.date, fragments = fragments.len(), "received AJAX fragments");
        for fragment in &fragments {
            programs.extend(self.parser.parse_programs(fragment, day.date));
        }

        info!(
            date = %day.date,
            weekday = day.weekday,
            from_page,
            from_ajax = programs.len() - from_page,
            "fetched listing day"
        );
        Ok(programs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::model::resolve_window;

    fn slot(time: &str, title: &str) -> String {
        format!(
            r#"<li><div class="over_hide"><span class="am">{time}</span><span class="p_show">{title}</span></div></li>"#
        )
    }

    #[derive(Default)]
    struct FakeListings {
        token: Option<String>,
        pages: HashMap<u32, String>,
        fragments: HashMap<u32, Vec<String>>,
        failing_weekday: Option<u32>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ListingsPort for FakeListings {
        async fn access_token(&self) -> Result<AccessToken, PortError> {
            self.calls.lock().expect("lock").push("token".to_owned());
            self.token
                .clone()
                .map(AccessToken)
                .ok_or_else(|| PortError::Authentication("rejected".to_owned()))
        }

        async fn day_page(&self, day: &ScheduleDay) -> Result<String, PortError> {
            self.calls.lock().expect("lock").push(format!("page w{}", day.weekday));
            if self.failing_weekday == Some(day.weekday) {
                return Err(PortError::Internal("page unavailable".to_owned()));
            }
            Ok(self.pages.get(&day.weekday).cloned().unwrap_or_default())
        }

        async fn day_fragments(
            &self,
            day: &ScheduleDay,
            token: &AccessToken,
        ) -> Result<Vec<String>, PortError> {
            assert_eq!(token.as_str(), "tok", "token is forwarded to AJAX calls");
            Ok(self.fragments.get(&day.weekday).cloned().unwrap_or_default())
        }
    }

    fn window() -> [ScheduleDay; 3] {
        // Monday, Tuesday, Wednesday.
        resolve_window(NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date"))
    }

    #[tokio::test]
    async fn rejected_token_aborts_before_any_fetch() {
        let listings = Arc::new(FakeListings::default());
        let port: Arc<dyn ListingsPort> = Arc::<FakeListings>::clone(&listings);
        let aggregator = ScheduleAggregator::new(port).expect("aggregator");

        let err = aggregator.fetch_all_programs(&window()).await.expect_err("no token");

        assert!(matches!(err, PortError::Authentication(_)));
        assert_eq!(*listings.calls.lock().expect("lock"), vec!["token".to_owned()]);
    }

    #[tokio::test]
    async fn merges_page_and_ajax_results_across_days_sorted() {
        let mut listings = FakeListings {
            token: Some("tok".to_owned()),
            ..FakeListings::default()
        };
        listings.pages.insert(1, slot("19:00", "Mon evening") + &slot("08:00", "Mon morning"));
        listings.fragments.insert(1, vec![slot("08:00", "Mon ajax tie")]);
        listings.pages.insert(2, slot("06:00", "Tue early"));
        listings.fragments.insert(3, vec![slot("23:30", "Wed late"), String::new()]);

        let aggregator = ScheduleAggregator::new(Arc::new(listings)).expect("aggregator");
        let programs = aggregator.fetch_all_programs(&window()).await.expect("programs");

        let titles: Vec<&str> = programs.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(
            titles,
            ["Mon morning", "Mon ajax tie", "Mon evening", "Tue early", "Wed late"]
        );
        assert_eq!(programs[3].start_formatted, "20261020060000 +0800");
    }

    #[tokio::test]
    async fn failing_day_discards_everything() {
        let mut listings = FakeListings {
            token: Some("tok".to_owned()),
            failing_weekday: Some(2),
            ..FakeListings::default()
        };
        listings.pages.insert(1, slot("08:00", "Mon"));

        let aggregator = ScheduleAggregator::new(Arc::new(listings)).expect("aggregator");
        let result = aggregator.fetch_all_programs(&window()).await;

        assert!(matches!(result, Err(PortError::Internal(_))));
    }
}
