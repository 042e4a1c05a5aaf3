//! Compliance notices for matched plates.
//!
//! A match whose registry row has any outstanding item (PUC, challan,
//! insurance) turns into an SMS to the row's contact number, carrying the
//! camera's address and one link per outstanding item.

pub mod location;
pub mod twilio;

use tracing::info;
use tracing::warn;

use crate::metrics::PipelineMetrics;
use crate::pipeline::MatchEvent;
use crate::pipeline::MatchSink;
use crate::plate_detection::normalize::normalize;
use crate::registry::Compliance;
use crate::registry::PlateRecord;
use crate::Result;

pub use location::{Location, LocationIqProvider, LocationProvider, StaticLocation};
pub use twilio::TwilioNotifier;

pub const PUC_LINK: &str = "Complete your PUC here: https://puc.parivahan.gov.in/puc/";
pub const CHALLAN_LINK: &str =
    "Pay your pending challan here: https://echallan.parivahan.gov.in/index/accused-challan";
pub const INSURANCE_LINK: &str = "Renew your insurance policy here: https://www.policybazaar.com";

/// Address used when the location provider cannot answer.
pub const UNKNOWN_LOCATION: &str = "unknown location";

/// Delivers a text message to a phone number.
pub trait Notifier {
    fn send(&mut self, message: &str, destination: &str) -> Result<()>;
}

/// Writes notices to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&mut self, message: &str, destination: &str) -> Result<()> {
        info!(%destination, %message, "compliance notice (not sent)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceNotice {
    pub destination: String,
    pub message: String,
}

/// Builds the notice for a record, or `None` when nothing is outstanding.
pub fn compose_notice(
    record: &PlateRecord,
    address: &str,
    country_prefix: &str,
) -> Option<ComplianceNotice> {
    let links: Vec<String> = [
        (record.puc, PUC_LINK),
        (record.challan, CHALLAN_LINK),
        (record.insurance_valid, INSURANCE_LINK),
    ]
    .into_iter()
    .filter(|(status, _)| *status == Compliance::No)
    .map(|(_, link)| format!("{link}\n\n"))
    .collect();

    if links.is_empty() {
        return None;
    }

    Some(ComplianceNotice {
        destination: format!("{country_prefix}{}", record.contact_number),
        message: format!(
            "Matched License Plate: {}.\n\nCurrent Location: {address}.\n{}",
            normalize(&record.plate),
            links.join(" ")
        ),
    })
}

/// Turns match events into compliance notices.
pub struct ComplianceDispatcher {
    notifier: Box<dyn Notifier>,
    location: Box<dyn LocationProvider>,
    country_prefix: String,
    metrics: Option<PipelineMetrics>,
    last_notice: Option<ComplianceNotice>,
}

impl ComplianceDispatcher {
    pub fn new(
        notifier: Box<dyn Notifier>,
        location: Box<dyn LocationProvider>,
        country_prefix: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            location,
            country_prefix: country_prefix.into(),
            metrics: None,
            last_notice: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Notice handed to the notifier most recently, whether or not it was
    /// delivered.
    pub fn last_notice(&self) -> Option<&ComplianceNotice> {
        self.last_notice.as_ref()
    }

    fn address(&mut self) -> String {
        match self.location.current_location() {
            Ok(location) => location.address,
            Err(e) => {
                warn!(error = %e, "location lookup failed");
                UNKNOWN_LOCATION.to_string()
            }
        }
    }

    fn count(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.notifications.with_label_values(&[outcome]).inc();
        }
    }
}

impl MatchSink for ComplianceDispatcher {
    fn on_match(&mut self, event: &MatchEvent) {
        info!(
            plate = %event.record.plate,
            score = event.score,
            color = %event.color.label,
            frame = event.frame_index,
            "registry match"
        );

        if !event.record.has_pending_compliance() {
            info!(plate = %event.record.plate, "no outstanding compliance, nothing to send");
            self.count("skipped");
            return;
        }

        let address = self.address();
        let Some(notice) = compose_notice(&event.record, &address, &self.country_prefix) else {
            self.count("skipped");
            return;
        };

        match self.notifier.send(&notice.message, &notice.destination) {
            Ok(()) => {
                info!(destination = %notice.destination, "compliance notice sent");
                self.count("sent");
            }
            Err(e) => {
                warn!(destination = %notice.destination, error = %e, "compliance notice failed");
                self.count("failed");
            }
        }
        self.last_notice = Some(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate_detection::color_classifier::ColorReport;
    use crate::PlateError;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Outbox = Rc<RefCell<Vec<(String, String)>>>;

    struct MockNotifier {
        outbox: Outbox,
        fail: bool,
    }

    impl Notifier for MockNotifier {
        fn send(&mut self, message: &str, destination: &str) -> Result<()> {
            self.outbox
                .borrow_mut()
                .push((message.to_string(), destination.to_string()));
            if self.fail {
                return Err(PlateError::Http("503 service unavailable".to_string()));
            }
            Ok(())
        }
    }

    struct FailingLocation;

    impl LocationProvider for FailingLocation {
        fn current_location(&mut self) -> Result<Location> {
            Err(PlateError::Http("geocoder down".to_string()))
        }
    }

    fn record(puc: Compliance, challan: Compliance, insurance: Compliance) -> PlateRecord {
        PlateRecord {
            plate: "MH 12 AB 1234".to_string(),
            puc,
            challan,
            insurance_valid: insurance,
            contact_number: "9876543210".to_string(),
        }
    }

    fn event(record: PlateRecord) -> MatchEvent {
        MatchEvent {
            record,
            color: ColorReport::unknown(),
            score: 100,
            frame_index: 7,
            plate_text: normalize("MH12AB1234"),
        }
    }

    fn dispatcher(
        location: Box<dyn LocationProvider>,
        fail: bool,
    ) -> (ComplianceDispatcher, Outbox, PipelineMetrics) {
        let outbox = Outbox::default();
        let metrics = PipelineMetrics::new().unwrap();
        let dispatcher = ComplianceDispatcher::new(
            Box::new(MockNotifier {
                outbox: outbox.clone(),
                fail,
            }),
            location,
            "+91",
        )
        .with_metrics(metrics.clone());
        (dispatcher, outbox, metrics)
    }

    #[test]
    fn challan_only_notice() {
        let (mut dispatcher, outbox, metrics) =
            dispatcher(Box::new(StaticLocation::new("Aurangabad, Maharashtra")), false);

        dispatcher.on_match(&event(record(Compliance::Yes, Compliance::No, Compliance::Yes)));

        let sent = outbox.borrow();
        assert_eq!(sent.len(), 1);
        let (message, destination) = &sent[0];
        assert_eq!(destination, "+919876543210");
        assert!(message.starts_with("Matched License Plate: MH12AB1234.\n\n"));
        assert!(message.contains("Current Location: Aurangabad, Maharashtra."));
        assert!(message.contains(CHALLAN_LINK));
        assert!(!message.contains(PUC_LINK));
        assert!(!message.contains(INSURANCE_LINK));
        assert_eq!(metrics.notifications.with_label_values(&["sent"]).get(), 1);
    }

    #[test]
    fn fully_compliant_record_sends_nothing() {
        let (mut dispatcher, outbox, metrics) =
            dispatcher(Box::new(StaticLocation::new("Pune")), false);

        dispatcher.on_match(&event(record(Compliance::Yes, Compliance::Yes, Compliance::Yes)));

        assert!(outbox.borrow().is_empty());
        assert!(dispatcher.last_notice().is_none());
        assert_eq!(metrics.notifications.with_label_values(&["skipped"]).get(), 1);
    }

    #[test]
    fn links_follow_flag_order() {
        let notice = compose_notice(
            &record(Compliance::No, Compliance::No, Compliance::No),
            "Nashik",
            "+91",
        )
        .unwrap();

        let puc = notice.message.find(PUC_LINK).unwrap();
        let challan = notice.message.find(CHALLAN_LINK).unwrap();
        let insurance = notice.message.find(INSURANCE_LINK).unwrap();
        assert!(puc < challan && challan < insurance);
        assert!(notice.message.ends_with("policybazaar.com\n\n"));
    }

    #[test]
    fn location_failure_falls_back() {
        let (mut dispatcher, _outbox, _) = dispatcher(Box::new(FailingLocation), false);

        dispatcher.on_match(&event(record(Compliance::No, Compliance::Yes, Compliance::Yes)));

        let notice = dispatcher.last_notice().unwrap();
        assert!(notice
            .message
            .contains(&format!("Current Location: {UNKNOWN_LOCATION}.")));
    }

    #[test]
    fn notifier_failure_is_absorbed() {
        let (mut dispatcher, outbox, metrics) =
            dispatcher(Box::new(StaticLocation::new("Pune")), true);

        dispatcher.on_match(&event(record(Compliance::Yes, Compliance::Yes, Compliance::No)));

        assert_eq!(outbox.borrow().len(), 1);
        assert!(dispatcher.last_notice().is_some());
        assert_eq!(metrics.notifications.with_label_values(&["failed"]).get(), 1);
    }
}
