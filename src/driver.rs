use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, DriverConfig, PageConfig};
use crate::error::Result;
use crate::page::{PageDriver, PageDriverFactory};
use crate::translate::{TranslationService, TranslationServiceFactory};

/// Driver phase within one translate-and-save cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Translating,
    Typing,
    Saving,
    ConfirmPending,
    Confirmed,
    Exhausted,
    Advancing,
}

/// Readiness of one user-facing control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Ready,
    Busy,
    Missing,
}

impl ControlState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ControlState::Ready)
    }
}

/// Per-control states, successors of the original panel's button flags.
/// Transitions happen only at driver phase changes.
#[derive(Debug, Clone, Copy)]
pub struct Controls {
    pub translate: ControlState,
    pub skip: ControlState,
    pub previous: ControlState,
    pub reset: ControlState,
}

impl Controls {
    fn all(state: ControlState) -> Self {
        Self {
            translate: state,
            skip: state,
            previous: state,
            reset: state,
        }
    }

    /// Map element presence to per-control readiness. Each control is ready
    /// exactly when the page elements it operates on are present.
    fn from_report(report: &ReadinessReport) -> Self {
        let to_state = |present: bool| {
            if present {
                ControlState::Ready
            } else {
                ControlState::Missing
            }
        };

        Self {
            translate: to_state(
                report.source_field
                    && report.destination_field
                    && report.save_control
                    && report.next_control,
            ),
            skip: to_state(report.next_control),
            previous: to_state(report.previous_control),
            reset: to_state(report.destination_field),
        }
    }
}

/// Presence of each required page element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadinessReport {
    pub source_field: bool,
    pub destination_field: bool,
    pub next_control: bool,
    pub previous_control: bool,
    pub save_control: bool,
}

impl ReadinessReport {
    pub fn ready(&self) -> bool {
        self.source_field
            && self.destination_field
            && self.next_control
            && self.previous_control
            && self.save_control
    }
}

/// Outcome of one translate-and-save cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The save was confirmed and the driver advanced.
    Saved,
    /// The confirmation poll ran out of attempts.
    Unconfirmed { advanced: bool },
    /// A step failed; the item was skipped by advancing.
    Skipped { reason: String },
    /// A cycle was already in flight or required elements are missing;
    /// nothing ran.
    NotReady,
}

/// Totals for a drive run.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveSummary {
    pub saved: u64,
    pub unconfirmed: u64,
    pub skipped: u64,
}

/// Executes "translate current item, save it, advance" cycles against the
/// hosted editor page.
pub struct StepDriver {
    timings: DriverConfig,
    selectors: PageConfig,
    page: Box<dyn PageDriver>,
    service: Box<dyn TranslationService>,
    controls: Controls,
    phase: Phase,
}

impl StepDriver {
    pub fn new(
        config: &Config,
        page: Box<dyn PageDriver>,
        service: Box<dyn TranslationService>,
    ) -> Self {
        Self {
            timings: config.driver.clone(),
            selectors: config.page.clone(),
            page,
            service,
            controls: Controls::all(ControlState::Missing),
            phase: Phase::Idle,
        }
    }

    /// Connect to the browser described by the config and wire up the
    /// translation service client.
    pub async fn connect(config: &Config) -> Result<Self> {
        let page = PageDriverFactory::connect(&config.browser).await?;
        let service = TranslationServiceFactory::create_service(config.service.clone());
        Ok(Self::new(config, page, service))
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Check which required page elements are currently present.
    pub async fn probe(&self) -> Result<ReadinessReport> {
        Ok(ReadinessReport {
            source_field: self.page.exists(&self.selectors.source_field).await?,
            destination_field: self.page.exists(&self.selectors.destination_field).await?,
            next_control: self.page.exists(&self.selectors.next_control).await?,
            previous_control: self.page.exists(&self.selectors.previous_control).await?,
            save_control: self.page.exists(&self.selectors.save_control).await?,
        })
    }

    /// Poll until every required element is present or the deadline passes.
    ///
    /// Starts at 100ms intervals and doubles up to 1s, for editors that
    /// render their fields after the initial page load.
    pub async fn wait_until_ready(&mut self) -> Result<ReadinessReport> {
        let deadline = Duration::from_secs(self.timings.ready_timeout_secs);
        let start = tokio::time::Instant::now();
        let mut poll_interval = Duration::from_millis(100);
        let max_interval = Duration::from_secs(1);

        loop {
            let report = self.probe().await?;
            self.controls = Controls::from_report(&report);

            if report.ready() {
                debug!("All page elements present");
                return Ok(report);
            }

            if start.elapsed() >= deadline {
                warn!("Page not fully ready after {:?}: {:?}", deadline, report);
                return Ok(report);
            }

            sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }

    /// Execute one full cycle. Never returns an error: any step failure is
    /// logged and converted into a single advance, trading a potentially
    /// unsaved item for uninterrupted throughput.
    pub async fn translate_and_save(&mut self) -> CycleOutcome {
        if !self.controls.translate.is_ready() {
            debug!(
                "Translate control not ready ({:?}); ignoring trigger",
                self.controls.translate
            );
            return CycleOutcome::NotReady;
        }

        let cycle_id = Uuid::new_v4();
        info!("Starting translate-and-save cycle {}", cycle_id);
        self.controls = Controls::all(ControlState::Busy);

        let outcome = match self.run_cycle().await {
            Ok(true) => {
                self.enter_phase(Phase::Confirmed);
                self.settle().await;
                self.advance_once().await;
                CycleOutcome::Saved
            }
            Ok(false) => {
                self.enter_phase(Phase::Exhausted);
                warn!(
                    "Save confirmation not detected after {} attempts",
                    self.timings.confirm_attempts
                );
                if self.timings.advance_on_unconfirmed {
                    warn!("Advancing past an unconfirmed save; the translation may not have persisted");
                    self.advance_once().await;
                    CycleOutcome::Unconfirmed { advanced: true }
                } else {
                    CycleOutcome::Unconfirmed { advanced: false }
                }
            }
            Err(e) => {
                warn!("Cycle {} failed: {}; skipping to next item", cycle_id, e);
                self.advance_once().await;
                CycleOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        self.enter_phase(Phase::Idle);
        self.controls = Controls::all(ControlState::Ready);
        info!("Cycle {} finished: {:?}", cycle_id, outcome);
        outcome
    }

    /// Run cycles until the count is reached. In strict mode the loop stops
    /// at the first cycle that does not end in a confirmed save.
    pub async fn drive(&mut self, count: u64, strict: bool) -> DriveSummary {
        let progress = ProgressBar::new(count);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut summary = DriveSummary::default();
        for _ in 0..count {
            let outcome = self.translate_and_save().await;
            match &outcome {
                CycleOutcome::Saved => summary.saved += 1,
                CycleOutcome::Unconfirmed { .. } => summary.unconfirmed += 1,
                CycleOutcome::Skipped { .. } => summary.skipped += 1,
                CycleOutcome::NotReady => {
                    warn!("Page no longer ready; stopping drive loop");
                    break;
                }
            }
            progress.inc(1);

            if strict && outcome != CycleOutcome::Saved {
                warn!("Stopping drive loop after a cycle without a confirmed save");
                break;
            }
        }

        progress.finish_and_clear();
        summary
    }

    /// Advance to the next string without translating.
    pub async fn skip(&mut self) -> Result<()> {
        if !self.controls.skip.is_ready() {
            debug!("Skip control not ready; ignoring trigger");
            return Ok(());
        }
        self.page.click(&self.selectors.next_control).await
    }

    /// Return to the previous string.
    pub async fn previous(&mut self) -> Result<()> {
        if !self.controls.previous.is_ready() {
            debug!("Previous control not ready; ignoring trigger");
            return Ok(());
        }
        self.page.click(&self.selectors.previous_control).await
    }

    /// Refocus the destination field to recover the editor state.
    pub async fn reset(&mut self) -> Result<()> {
        if !self.controls.reset.is_ready() {
            debug!("Reset control not ready; ignoring trigger");
            return Ok(());
        }

        self.controls = Controls::all(ControlState::Busy);
        let result = self.page.focus_field(&self.selectors.destination_field).await;
        self.controls = Controls::all(ControlState::Ready);

        match result {
            Ok(()) => {
                info!("Reset successful");
                Ok(())
            }
            Err(e) => {
                warn!("Reset failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<bool> {
        self.enter_phase(Phase::Translating);
        let source = self.page.read_field(&self.selectors.source_field).await?;
        info!("Source: {}", source);

        let translated = self.service.translate(&source).await?;
        info!("Target: {}", translated);

        self.enter_phase(Phase::Typing);
        self.type_translation(&translated).await?;

        self.settle().await;
        self.enter_phase(Phase::Saving);
        self.page.click(&self.selectors.save_control).await?;

        sleep(Duration::from_millis(self.timings.post_save_delay_ms)).await;
        self.enter_phase(Phase::ConfirmPending);
        self.confirm_saved().await
    }

    /// Type the translation into the destination field one character at a
    /// time, dispatching one input notification per character. Some editors
    /// only register changes that arrive as discrete input events, not bulk
    /// assignment.
    async fn type_translation(&mut self, text: &str) -> Result<()> {
        let destination = self.selectors.destination_field.clone();

        self.page.focus_field(&destination).await?;
        self.page.clear_field(&destination).await?;

        let lo = self.timings.type_delay_min_ms.min(self.timings.type_delay_max_ms);
        let hi = self.timings.type_delay_min_ms.max(self.timings.type_delay_max_ms);

        let mut typed = String::with_capacity(text.len());
        for ch in text.chars() {
            typed.push(ch);
            self.page.set_field(&destination, &typed).await?;

            let delay = { rand::thread_rng().gen_range(lo..=hi) };
            sleep(Duration::from_millis(delay)).await;
        }

        Ok(())
    }

    /// Bounded poll for the confirmation marker, re-invoking save on each
    /// unconfirmed attempt. Exhaustion is a value, not an error.
    async fn confirm_saved(&mut self) -> Result<bool> {
        for attempt in 1..=self.timings.confirm_attempts {
            sleep(Duration::from_millis(self.timings.confirm_interval_ms)).await;

            if self.page.exists(&self.selectors.confirmation_marker).await? {
                debug!("Save confirmation detected on attempt {}", attempt);
                return Ok(true);
            }

            debug!(
                "No confirmation yet (attempt {}/{}); retrying save",
                attempt, self.timings.confirm_attempts
            );
            if let Err(e) = self.page.click(&self.selectors.save_control).await {
                warn!("Save retry failed: {}", e);
            }
        }

        Ok(false)
    }

    /// The single advance call site: every completed cycle passes through
    /// here exactly once. An unfindable next control is logged, never fatal.
    async fn advance_once(&mut self) {
        self.enter_phase(Phase::Advancing);
        if let Err(e) = self.page.click(&self.selectors.next_control).await {
            warn!("Could not advance to the next item: {}", e);
        }
    }

    async fn settle(&self) {
        sleep(Duration::from_millis(self.timings.settle_delay_ms)).await;
    }

    fn enter_phase(&mut self, phase: Phase) {
        debug!("Phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;
    use mockall::mock;
    use parking_lot::Mutex;

    use crate::error::AutopressError;

    #[derive(Default)]
    struct PageState {
        fields: HashMap<String, String>,
        present: HashSet<String>,
        input_events: Vec<(String, String)>,
        clicks: Vec<String>,
        focus_calls: Vec<String>,
        save_clicks: u32,
        confirm_after_saves: Option<u32>,
        marker_present: bool,
    }

    /// In-memory page: fields, presence and a confirmation marker that
    /// appears after a configurable number of save clicks.
    #[derive(Clone)]
    struct MockPage {
        state: Arc<Mutex<PageState>>,
        save_selector: String,
        marker_selector: String,
    }

    impl MockPage {
        fn new(config: &Config, source_text: &str, confirm_after_saves: Option<u32>) -> Self {
            let mut state = PageState::default();
            state.present.insert(config.page.source_field.clone());
            state.present.insert(config.page.destination_field.clone());
            state.present.insert(config.page.next_control.clone());
            state.present.insert(config.page.previous_control.clone());
            state.present.insert(config.page.save_control.clone());
            state
                .fields
                .insert(config.page.source_field.clone(), source_text.to_string());
            state.confirm_after_saves = confirm_after_saves;

            Self {
                state: Arc::new(Mutex::new(state)),
                save_selector: config.page.save_control.clone(),
                marker_selector: config.page.confirmation_marker.clone(),
            }
        }

        fn remove(&self, selector: &str) {
            self.state.lock().present.remove(selector);
        }

        fn clicks_on(&self, selector: &str) -> usize {
            self.state
                .lock()
                .clicks
                .iter()
                .filter(|s| s.as_str() == selector)
                .count()
        }

        fn destination_events(&self, config: &Config) -> Vec<String> {
            self.state
                .lock()
                .input_events
                .iter()
                .filter(|(sel, _)| sel == &config.page.destination_field)
                .map(|(_, value)| value.clone())
                .collect()
        }

        fn field(&self, selector: &str) -> Option<String> {
            self.state.lock().fields.get(selector).cloned()
        }
    }

    #[async_trait]
    impl PageDriver for MockPage {
        async fn read_field(&self, selector: &str) -> Result<String> {
            let state = self.state.lock();
            if !state.present.contains(selector) {
                return Err(AutopressError::ElementNotFound(selector.to_string()));
            }
            Ok(state.fields.get(selector).cloned().unwrap_or_default())
        }

        async fn clear_field(&self, selector: &str) -> Result<()> {
            let mut state = self.state.lock();
            if !state.present.contains(selector) {
                return Err(AutopressError::ElementNotFound(selector.to_string()));
            }
            state.fields.insert(selector.to_string(), String::new());
            Ok(())
        }

        async fn set_field(&self, selector: &str, value: &str) -> Result<()> {
            let mut state = self.state.lock();
            if !state.present.contains(selector) {
                return Err(AutopressError::ElementNotFound(selector.to_string()));
            }
            state.fields.insert(selector.to_string(), value.to_string());
            state
                .input_events
                .push((selector.to_string(), value.to_string()));
            Ok(())
        }

        async fn focus_field(&self, selector: &str) -> Result<()> {
            let mut state = self.state.lock();
            if !state.present.contains(selector) {
                return Err(AutopressError::ElementNotFound(selector.to_string()));
            }
            state.focus_calls.push(selector.to_string());
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<()> {
            let mut state = self.state.lock();
            if !state.present.contains(selector) {
                return Err(AutopressError::ElementNotFound(selector.to_string()));
            }
            state.clicks.push(selector.to_string());
            if selector == self.save_selector {
                state.save_clicks += 1;
                if let Some(threshold) = state.confirm_after_saves {
                    if state.save_clicks >= threshold {
                        state.marker_present = true;
                    }
                }
            }
            Ok(())
        }

        async fn exists(&self, selector: &str) -> Result<bool> {
            let state = self.state.lock();
            if selector == self.marker_selector {
                return Ok(state.marker_present);
            }
            Ok(state.present.contains(selector))
        }
    }

    mock! {
        Service {}

        #[async_trait]
        impl TranslationService for Service {
            async fn translate(&self, text: &str) -> Result<String>;
        }
    }

    fn ready_driver(config: &Config, page: &MockPage, service: MockService) -> StepDriver {
        let mut driver = StepDriver::new(config, Box::new(page.clone()), Box::new(service));
        driver.controls = Controls::all(ControlState::Ready);
        driver
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_emits_one_input_event_per_character() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello there", Some(1));

        let mut service = MockService::new();
        service
            .expect_translate()
            .withf(|text| text == "Hello there")
            .returning(|_| Ok("Ciao a tutti".to_string()));

        let mut driver = ready_driver(&config, &page, service);
        let outcome = driver.translate_and_save().await;
        assert_eq!(outcome, CycleOutcome::Saved);

        let events = page.destination_events(&config);
        let translated = "Ciao a tutti";
        assert_eq!(events.len(), translated.chars().count());
        for (i, value) in events.iter().enumerate() {
            let prefix: String = translated.chars().take(i + 1).collect();
            assert_eq!(value, &prefix);
        }
        assert_eq!(events.last().map(String::as_str), Some(translated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_cycle_end_to_end() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", Some(1));

        let mut service = MockService::new();
        service
            .expect_translate()
            .withf(|text| text == "Hello")
            .returning(|_| Ok("Ciao".to_string()));

        let mut driver = ready_driver(&config, &page, service);
        let outcome = driver.translate_and_save().await;

        assert_eq!(outcome, CycleOutcome::Saved);
        assert_eq!(
            page.field(&config.page.destination_field).as_deref(),
            Some("Ciao")
        );
        assert!(page.clicks_on(&config.page.save_control) >= 1);
        assert_eq!(page.clicks_on(&config.page.next_control), 1);
        assert!(driver.controls().translate.is_ready());
        assert!(driver.controls().skip.is_ready());
        assert_eq!(driver.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_failure_skips_exactly_once() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", Some(1));

        let mut service = MockService::new();
        service.expect_translate().returning(|_| {
            Err(AutopressError::Translation(
                "Translation service error 500 Internal Server Error".to_string(),
            ))
        });

        let mut driver = ready_driver(&config, &page, service);
        let outcome = driver.translate_and_save().await;

        assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
        assert!(page.destination_events(&config).is_empty());
        assert_eq!(page.clicks_on(&config.page.save_control), 0);
        assert_eq!(page.clicks_on(&config.page.next_control), 1);
        assert!(driver.controls().translate.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_poll_is_bounded() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", None);

        let mut service = MockService::new();
        service
            .expect_translate()
            .returning(|_| Ok("Ciao".to_string()));

        let mut driver = ready_driver(&config, &page, service);
        let start = tokio::time::Instant::now();
        let outcome = driver.translate_and_save().await;

        assert_eq!(outcome, CycleOutcome::Unconfirmed { advanced: true });

        // Initial save plus one retry per unconfirmed attempt.
        let state = page.state.lock();
        assert_eq!(state.save_clicks, 1 + config.driver.confirm_attempts);
        drop(state);

        let minimum_poll_time = Duration::from_millis(
            u64::from(config.driver.confirm_attempts) * config.driver.confirm_interval_ms,
        );
        assert!(start.elapsed() >= minimum_poll_time);
        assert_eq!(page.clicks_on(&config.page.next_control), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_busy_is_noop() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", Some(1));
        let service = MockService::new();

        let mut driver = ready_driver(&config, &page, service);
        driver.controls = Controls::all(ControlState::Busy);

        let outcome = driver.translate_and_save().await;
        assert_eq!(outcome, CycleOutcome::NotReady);
        assert!(page.state.lock().clicks.is_empty());
        assert!(page.destination_events(&config).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_save_can_halt_instead_of_advancing() {
        let mut config = Config::default();
        config.driver.advance_on_unconfirmed = false;
        config.driver.confirm_attempts = 3;
        let page = MockPage::new(&config, "Hello", None);

        let mut service = MockService::new();
        service
            .expect_translate()
            .returning(|_| Ok("Ciao".to_string()));

        let mut driver = ready_driver(&config, &page, service);
        let outcome = driver.translate_and_save().await;

        assert_eq!(outcome, CycleOutcome::Unconfirmed { advanced: false });
        assert_eq!(page.clicks_on(&config.page.next_control), 0);
        assert!(driver.controls().translate.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_disables_dependent_controls() {
        let mut config = Config::default();
        config.driver.ready_timeout_secs = 0;
        let page = MockPage::new(&config, "Hello", Some(1));
        page.remove(&config.page.next_control);

        let service = MockService::new();
        let mut driver = StepDriver::new(&config, Box::new(page.clone()), Box::new(service));

        let report = driver.wait_until_ready().await.unwrap();
        assert!(!report.ready());
        assert!(!report.next_control);
        assert!(report.source_field);

        assert_eq!(driver.controls().translate, ControlState::Missing);
        assert_eq!(driver.controls().skip, ControlState::Missing);
        assert_eq!(driver.controls().previous, ControlState::Ready);

        let outcome = driver.translate_and_save().await;
        assert_eq!(outcome, CycleOutcome::NotReady);
        assert!(page.state.lock().clicks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_and_previous_dispatch_single_clicks() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", Some(1));
        let service = MockService::new();

        let mut driver = ready_driver(&config, &page, service);

        driver.skip().await.unwrap();
        assert_eq!(page.clicks_on(&config.page.next_control), 1);

        driver.previous().await.unwrap();
        assert_eq!(page.clicks_on(&config.page.previous_control), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_refocuses_destination_field() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", Some(1));
        let service = MockService::new();

        let mut driver = ready_driver(&config, &page, service);
        driver.reset().await.unwrap();

        let state = page.state.lock();
        assert_eq!(
            state.focus_calls,
            vec![config.page.destination_field.clone()]
        );
        drop(state);
        assert!(driver.controls().translate.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_counts_outcomes() {
        let config = Config::default();
        let page = MockPage::new(&config, "Hello", Some(1));

        let mut service = MockService::new();
        service
            .expect_translate()
            .returning(|_| Ok("Ciao".to_string()));

        let mut driver = ready_driver(&config, &page, service);
        let summary = driver.drive(3, false).await;

        assert_eq!(summary.saved, 3);
        assert_eq!(summary.unconfirmed, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(page.clicks_on(&config.page.next_control), 3);
    }
}
