//! Extraction of programme slots from tvmao schedule pages and AJAX fragments.

use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::model::ProgramEntry;
use crate::ports::PortError;

const SLOT_SELECTOR: &str = "li > div.over_hide";
const AM_SELECTOR: &str = "span.am";
const PM_SELECTOR: &str = "span.pm";
const TITLE_SELECTOR: &str = "span.p_show";

const DATE_FORMAT: &str = "%Y%m%d";
const SLOT_TIME_FORMAT: &str = "%Y%m%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why a candidate slot produced no programme.
pub enum SkipReason {
    /// Neither an `am` nor a `pm` time label was present.
    MissingTime,
    /// The slot had no title element.
    MissingTitle,
    /// The time label did not combine with the day into a valid timestamp.
    InvalidTime {
        /// Literal label as scraped.
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of parsing one candidate slot.
pub enum SlotOutcome {
    /// The slot yielded a programme.
    Parsed(ProgramEntry),
    /// The slot was dropped.
    Skipped(SkipReason),
}

/// Parser for the `li > div.over_hide` slot markup used on the listing site.
#[derive(Debug)]
pub struct FragmentParser {
    slot: Selector,
    am: Selector,
    pm: Selector,
    title: Selector,
}

impl FragmentParser {
    /// Compile the slot selectors.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Selector`] if a selector fails to compile.
    pub fn new() -> Result<Self, PortError> {
        Ok(Self {
            slot: selector(SLOT_SELECTOR)?,
            am: selector(AM_SELECTOR)?,
            pm: selector(PM_SELECTOR)?,
            title: selector(TITLE_SELECTOR)?,
        })
    }

    /// Parse every candidate slot of `fragment`, tagging times with `date`.
    ///
    /// The time label is taken literally. An `am`/`pm` label is expected to already be
    /// a 24-hour `HH:MM` value; no 12-hour adjustment is applied.
    #[must_use]
    pub fn parse_slots(&self, fragment: &str, date: NaiveDate) -> Vec<SlotOutcome> {
        let document = Html::parse_document(fragment);
        let day = date.format(DATE_FORMAT).to_string();

        document
            .select(&self.slot)
            .map(|slot| self.parse_slot(slot, &day))
            .collect()
    }

    /// Parse `fragment` into programme entries in document order, dropping bad slots.
    #[must_use]
    pub fn parse_programs(&self, fragment: &str, date: NaiveDate) -> Vec<ProgramEntry> {
        self.parse_slots(fragment, date)
            .into_iter()
            .filter_map(|outcome| match outcome {
                SlotOutcome::Parsed(entry) => Some(entry),
                SlotOutcome::Skipped(reason) => {
                    debug!(%date, ?reason, "skipping listing slot");
                    None
                }
            })
            .collect()
    }

    fn parse_slot(&self, slot: ElementRef<'_>, day: &str) -> SlotOutcome {
        let Some(time_tag) = slot
            .select(&self.am)
            .next()
            .or_else(|| slot.select(&self.pm).next())
        else {
            return SlotOutcome::Skipped(SkipReason::MissingTime);
        };
        let Some(title_tag) = slot.select(&self.title).next() else {
            return SlotOutcome::Skipped(SkipReason::MissingTitle);
        };

        let label: String = time_tag.text().map(str::trim).collect();
        let title = title_tag
            .text()
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        match NaiveDateTime::parse_from_str(&format!("{day} {label}"), SLOT_TIME_FORMAT) {
            Ok(start) => SlotOutcome::Parsed(ProgramEntry::new(start, title)),
            Err(_err) => SlotOutcome::Skipped(SkipReason::InvalidTime { label }),
        }
    }
}

fn selector(css: &str) -> Result<Selector, PortError> {
    Selector::parse(css).map_err(|err| PortError::Selector(format!("{css}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn parser() -> FragmentParser {
        FragmentParser::new().expect("selectors compile")
    }

    #[test]
    fn parses_slots_in_document_order() {
        let html = r#"
            <ul id="pgrow">
              <li><div class="over_hide"><span class="am">07:30</span>
                  <span class="p_show"><a href="/drama/1">体育 新闻</a></span></div></li>
              <li><div class="over_hide"><span class="pm">13:05</span>
                  <span class="p_show">  足球   <em>直播</em> </span></div></li>
            </ul>"#;

        let entries = parser().parse_programs(html, day());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "体育 新闻");
        assert_eq!(entries[0].start_formatted, "20261019073000 +0800");
        assert_eq!(entries[1].title, "足球 直播");
        assert_eq!(entries[1].start_formatted, "20261019130500 +0800");
    }

    #[test]
    fn bad_slot_is_skipped_not_fatal() {
        let html = r#"
            <li><div class="over_hide"><span class="am">08:00</span><span class="p_show">晨间新闻</span></div></li>
            <li><div class="over_hide"><span class="am">待定</span><span class="p_show">未知</span></div></li>"#;

        let outcomes = parser().parse_slots(html, day());
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], SlotOutcome::Parsed(_)));
        assert_eq!(
            outcomes[1],
            SlotOutcome::Skipped(SkipReason::InvalidTime { label: "待定".to_owned() })
        );

        assert_eq!(parser().parse_programs(html, day()).len(), 1);
    }

    #[test]
    fn am_label_wins_over_pm_label() {
        let html = r#"<li><div class="over_hide"><span class="pm">21:00</span><span class="am">09:00</span><span class="p_show">A</span></div></li>"#;
        let entries = parser().parse_programs(html, day());
        assert_eq!(entries[0].start_formatted, "20261019090000 +0800");
    }

    #[test]
    fn pm_label_is_taken_literally() {
        let html = r#"<li><div class="over_hide"><span class="pm">01:15</span><span class="p_show">B</span></div></li>"#;
        let entries = parser().parse_programs(html, day());
        assert_eq!(entries[0].start_formatted, "20261019011500 +0800");
    }

    #[test]
    fn missing_parts_are_reported() {
        let html = r#"
            <li><div class="over_hide"><span class="p_show">no time</span></div></li>
            <li><div class="over_hide"><span class="am">10:00</span></div></li>"#;
        assert_eq!(
            parser().parse_slots(html, day()),
            vec![
                SlotOutcome::Skipped(SkipReason::MissingTime),
                SlotOutcome::Skipped(SkipReason::MissingTitle),
            ]
        );
    }

    #[test]
    fn only_direct_children_of_list_items_are_slots() {
        let html = r#"
            <div class="over_hide"><span class="am">10:00</span><span class="p_show">outside</span></div>
            <li><section><div class="over_hide"><span class="am">11:00</span><span class="p_show">nested</span></div></section></li>"#;
        assert!(parser().parse_slots(html, day()).is_empty());
    }
}
