use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::{Value, json};

use daily_read::config::Config;
use daily_read::domain::{ProjectRecord, PublishState, StatusPriority};
use daily_read::error::DailyReadError;
use daily_read::order_portal::{Order, OrderPortalClient, ReportUpload};
use daily_read::reconcile::OrderReconciler;

#[derive(Default)]
struct MockPortal {
    orders: HashMap<String, Vec<Order>>,
    calls: Mutex<Vec<String>>,
}

impl MockPortal {
    fn with_orders(orderer: &str, orders: Value) -> Self {
        let mut portal = Self::default();
        portal.orders.insert(
            orderer.to_string(),
            serde_json::from_value(orders).unwrap(),
        );
        portal
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl OrderPortalClient for MockPortal {
    fn orders_for(&self, orderer: &str) -> Result<Vec<Order>, DailyReadError> {
        self.calls.lock().unwrap().push(format!("orders {orderer}"));
        Ok(self.orders.get(orderer).cloned().unwrap_or_default())
    }

    fn upload_report(
        &self,
        upload: &ReportUpload,
        existing: Option<&str>,
    ) -> Result<String, DailyReadError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("upload {} {:?} {}", upload.order, existing, upload.status));
        if upload.order == "REJECTED" {
            return Err(DailyReadError::Upload {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(existing.map_or_else(|| format!("iuid-{}", upload.order), str::to_string))
    }

    fn delete_report(&self, iuid: &str) -> Result<(), DailyReadError> {
        self.calls.lock().unwrap().push(format!("delete {iuid}"));
        Ok(())
    }
}

const ORDERER: &str = "dummy@dummy.se";

fn config() -> Config {
    let mut config = Config::new("/srv/daily_read/data");
    config.order_portal_url = Some("https://orders.example.se".to_string());
    config.order_portal_api_key = Some("key".to_string());
    config
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 7, 31).unwrap()
}

fn project(id: &str, statuses: &[&str]) -> ProjectRecord {
    ProjectRecord::new(
        format!("NGIS/2023/{id}.json"),
        Some(json!({
            "orderer": ORDERER,
            "portal_id": id,
            "proj_dates": {"2023-07-01": statuses},
        })),
    )
    .unwrap()
}

fn order(id: &str, reports: Value) -> Value {
    json!({
        "identifier": id,
        "owner": {"email": ORDERER, "name": "Dummy"},
        "status": "accepted",
        "reports": reports,
    })
}

#[test]
fn open_request_for_reached_status_is_uploaded() {
    let portal = MockPortal::with_orders(
        ORDERER,
        json!([order(
            "NGI123456",
            json!([
                {"status_label": "Library QC finished", "state": "open"},
                {"status_label": "All Samples Sequenced", "state": "open"},
            ])
        )]),
    );
    let projects = vec![project(
        "NGI123456",
        &["Samples Received", "Library QC finished"],
    )];
    let config = config();
    let mut reconciler = OrderReconciler::new(&config, &portal, projects).unwrap();
    reconciler.get_orders(ORDERER).unwrap();
    let modified = reconciler
        .process_orders_on(&StatusPriority::default(), today())
        .unwrap();

    let orders = &modified[ORDERER];
    assert_eq!(orders.projects.len(), 1);
    assert_eq!(orders.projects["Library QC finished"][0].project_id, "NGI123456");
    assert!(orders.delete_report_for.is_empty());
    assert_eq!(reconciler.counts().upload, 1);
}

#[test]
fn highest_priority_label_wins() {
    let portal = MockPortal::with_orders(
        ORDERER,
        json!([order(
            "P1",
            json!([
                {"status_label": "Samples Received", "state": "open"},
                {"status_label": "All Samples Sequenced", "state": "open"},
                {"status_label": "Library QC finished", "state": "open"},
            ])
        )]),
    );
    let projects = vec![project(
        "P1",
        &["Samples Received", "Library QC finished", "All Samples Sequenced"],
    )];
    let config = config();
    let mut reconciler = OrderReconciler::new(&config, &portal, projects).unwrap();
    reconciler.get_orders(ORDERER).unwrap();
    let modified = reconciler
        .process_orders_on(&StatusPriority::default(), today())
        .unwrap();
    assert_eq!(
        modified[ORDERER].projects.keys().collect::<Vec<_>>(),
        vec!["All Samples Sequenced"]
    );
}

#[test]
fn recently_closed_request_is_removed() {
    let portal = MockPortal::with_orders(
        ORDERER,
        json!([
            order(
                "P1",
                json!([{
                    "iuid": "abc123",
                    "status_label": "All Raw data Delivered",
                    "state": "closed",
                    "closed": "2023-07-20"
                }])
            ),
            order(
                "P2",
                json!([{
                    "status_label": "All Raw data Delivered",
                    "state": "closed",
                    "closed": "2023-05-01"
                }])
            ),
        ]),
    );
    let projects = vec![project("P1", &[]), project("P2", &[])];
    let config = config();
    let mut reconciler = OrderReconciler::new(&config, &portal, projects).unwrap();
    reconciler.get_orders(ORDERER).unwrap();
    let modified = reconciler
        .process_orders_on(&StatusPriority::default(), today())
        .unwrap();

    let removals = modified[ORDERER].delete_report_for["All Raw data Delivered"].clone();
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0].project_id, "P1");
    assert_eq!(removals[0].report_iuid.as_deref(), Some("abc123"));

    assert!(reconciler.delete_report_from_order_portal(&removals[0]).unwrap());
    assert_eq!(portal.calls().last().unwrap(), "delete abc123");
}

#[test]
fn orders_for_unchanged_projects_are_ignored() {
    let portal = MockPortal::with_orders(
        ORDERER,
        json!([order(
            "SOMEONE_ELSE",
            json!([{"status_label": "Samples Received", "state": "open"}])
        )]),
    );
    let config = config();
    let mut reconciler =
        OrderReconciler::new(&config, &portal, vec![project("P1", &["Samples Received"])]).unwrap();
    reconciler.get_orders(ORDERER).unwrap();
    let modified = reconciler
        .process_orders_on(&StatusPriority::default(), today())
        .unwrap();
    assert!(modified.is_empty());
}

#[test]
fn other_report_names_are_ignored() {
    let portal = MockPortal::with_orders(
        ORDERER,
        json!([order(
            "P1",
            json!([{"name": "Invoice", "status_label": "Samples Received", "state": "open"}])
        )]),
    );
    let config = config();
    let mut reconciler =
        OrderReconciler::new(&config, &portal, vec![project("P1", &["Samples Received"])]).unwrap();
    reconciler.get_orders(ORDERER).unwrap();
    let modified = reconciler
        .process_orders_on(&StatusPriority::default(), today())
        .unwrap();
    assert!(modified.is_empty());
}

#[test]
fn duplicate_report_requests_are_rejected() {
    let portal = MockPortal::with_orders(
        ORDERER,
        json!([order(
            "NGI123456",
            json!([
                {"status_label": "Library QC finished", "state": "open"},
                {"status_label": "Library QC finished", "state": "closed", "closed": "2023-07-30"},
            ])
        )]),
    );
    let config = config();
    let mut reconciler = OrderReconciler::new(
        &config,
        &portal,
        vec![project("NGI123456", &["Library QC finished"])],
    )
    .unwrap();
    reconciler.get_orders(ORDERER).unwrap();
    let err = reconciler
        .process_orders_on(&StatusPriority::default(), today())
        .unwrap_err();
    assert_matches!(
        err,
        DailyReadError::Validation(ref msg)
            if msg == "Multiple reports for Project Progress found in the Order Portal for order NGI123456"
    );
}

#[test]
fn portal_settings_are_required() {
    let portal = MockPortal::default();

    let mut no_url = config();
    no_url.order_portal_url = None;
    let err = OrderReconciler::new(&no_url, &portal, Vec::new()).err().unwrap();
    assert_matches!(err, DailyReadError::Configuration(ref msg) if msg.contains("ORDER_PORTAL_URL"));

    let mut no_key = config();
    no_key.order_portal_api_key = None;
    let err = OrderReconciler::new(&no_key, &portal, Vec::new()).err().unwrap();
    assert_matches!(err, DailyReadError::Configuration(ref msg) if msg.contains("ORDER_PORTAL_API_KEY"));
}

#[test]
fn upload_creates_then_replaces() {
    let portal = MockPortal::default();
    let config = config();
    let reconciler = OrderReconciler::new(&config, &portal, Vec::new()).unwrap();

    let mut record = project("P1", &["Samples Received"]);
    let iuid = reconciler
        .upload_report_to_order_portal("<html></html>", &record, PublishState::Review)
        .unwrap();
    assert_eq!(iuid, "iuid-P1");

    record.report_iuid = Some(iuid);
    reconciler
        .upload_report_to_order_portal("<html></html>", &record, PublishState::Published)
        .unwrap();
    assert_eq!(
        portal.calls(),
        vec![
            "upload P1 None review".to_string(),
            "upload P1 Some(\"iuid-P1\") published".to_string(),
        ]
    );
}

#[test]
fn failed_upload_is_returned() {
    let portal = MockPortal::default();
    let config = config();
    let reconciler = OrderReconciler::new(&config, &portal, Vec::new()).unwrap();
    let record = project("REJECTED", &[]);
    let err = reconciler
        .upload_report_to_order_portal("<html></html>", &record, PublishState::Published)
        .unwrap_err();
    assert_matches!(err, DailyReadError::Upload { status: 500, .. });
}

#[test]
fn nothing_to_delete_without_iuid() {
    let portal = MockPortal::default();
    let config = config();
    let reconciler = OrderReconciler::new(&config, &portal, Vec::new()).unwrap();
    assert!(!reconciler
        .delete_report_from_order_portal(&project("P1", &[]))
        .unwrap());
    assert!(portal.calls().is_empty());
}

#[test]
fn results_accumulate_per_orderer() {
    let other = "other@dummy.se";
    let mut portal = MockPortal::with_orders(
        ORDERER,
        json!([order(
            "P1",
            json!([{"status_label": "Samples Received", "state": "open"}])
        )]),
    );
    portal.orders.insert(
        other.to_string(),
        serde_json::from_value(json!([{
            "identifier": "P2",
            "owner": {"email": other},
            "reports": [{"status_label": "Samples Received", "state": "open"}],
        }]))
        .unwrap(),
    );
    let config = config();
    let mut reconciler = OrderReconciler::new(
        &config,
        &portal,
        vec![
            project("P1", &["Samples Received"]),
            project("P2", &["Samples Received"]),
        ],
    )
    .unwrap();
    for orderer in [ORDERER, other] {
        reconciler.get_orders(orderer).unwrap();
        reconciler
            .process_orders_on(&StatusPriority::default(), today())
            .unwrap();
    }
    assert_eq!(reconciler.modified_orders().len(), 2);
    assert_eq!(reconciler.counts().upload, 2);
    assert_eq!(
        portal.calls(),
        vec![format!("orders {ORDERER}"), format!("orders {other}")]
    );
}

#[test]
fn orders_keep_portal_sequence_and_are_replaced() {
    let other = "other@dummy.se";
    let mut portal = MockPortal::with_orders(
        ORDERER,
        json!([
            order("NGI9", json!([])),
            order("NGI1", json!([])),
            order("NGI5", json!([])),
        ]),
    );
    portal.orders.insert(
        other.to_string(),
        serde_json::from_value(json!([order("NGI3", json!([]))])).unwrap(),
    );
    let config = config();
    let mut reconciler = OrderReconciler::new(&config, &portal, Vec::new()).unwrap();

    reconciler.get_orders(ORDERER).unwrap();
    let ids = |reconciler: &OrderReconciler<'_, MockPortal>| {
        reconciler
            .all_orders()
            .iter()
            .map(|order| order.identifier.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&reconciler), vec!["NGI9", "NGI1", "NGI5"]);

    reconciler.get_orders(other).unwrap();
    assert_eq!(ids(&reconciler), vec!["NGI3"]);
}
