use super::*;
use serde_json::json;

type CallLog = Arc<Mutex<Vec<String>>>;

fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &CallLog) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

fn push(log: &CallLog, entry: impl Into<String>) {
    log.lock().expect("log lock").push(entry.into());
}

fn order_created() -> NotificationEvent {
    NotificationEvent::message(json!({"type": "ORDER_CREATED", "id": "42"}))
}

// =============================================================================
// subscribe / unsubscribe bookkeeping
// =============================================================================

#[test]
fn first_subscriber_creates_topic_entry() {
    let registry = SubscriberRegistry::new();
    assert!(!registry.has_topic("BookReserved"));

    let sub = registry.subscribe("BookReserved", |_| {});
    assert!(registry.has_topic("BookReserved"));
    assert_eq!(registry.subscriber_count("BookReserved"), 1);
    assert!(sub.is_active());
}

#[test]
fn last_unsubscribe_removes_topic_entry() {
    let registry = SubscriberRegistry::new();
    let a = registry.subscribe("BookReserved", |_| {});
    let b = registry.subscribe("BookReserved", |_| {});
    assert_eq!(registry.subscriber_count("BookReserved"), 2);

    a.unsubscribe();
    assert_eq!(registry.subscriber_count("BookReserved"), 1);
    assert!(registry.has_topic("BookReserved"));

    b.unsubscribe();
    assert_eq!(registry.subscriber_count("BookReserved"), 0);
    assert!(!registry.has_topic("BookReserved"));
    assert_eq!(registry.topic_count(), 0);
}

#[test]
fn balanced_subscribe_unsubscribe_leaves_registry_empty() {
    let registry = SubscriberRegistry::new();
    for n in [1_usize, 2, 5, 17] {
        let subs: Vec<Subscription> = (0..n)
            .map(|i| registry.subscribe(if i % 2 == 0 { "A" } else { "B" }, |_| {}))
            .collect();
        let alls: Vec<Subscription> = (0..n).map(|_| registry.subscribe_all(|_| {})).collect();
        assert!(registry.topic_count() > 0);

        // Unsubscribe in reverse order, half explicitly and half by drop.
        for (i, sub) in subs.into_iter().rev().enumerate() {
            if i % 2 == 0 {
                sub.unsubscribe();
            } else {
                drop(sub);
            }
        }
        drop(alls);

        assert_eq!(registry.topic_count(), 0, "n = {n}");
        assert_eq!(registry.catch_all_count(), 0, "n = {n}");
    }
}

#[test]
fn unsubscribe_removes_exactly_that_callback() {
    let registry = SubscriberRegistry::new();
    let log = call_log();

    let first_log = log.clone();
    let first = registry.subscribe("ORDER_CREATED", move |_| push(&first_log, "first"));
    let second_log = log.clone();
    let _second = registry.subscribe("ORDER_CREATED", move |_| push(&second_log, "second"));

    first.unsubscribe();
    registry.dispatch(&order_created());
    assert_eq!(entries(&log), vec!["second"]);
}

#[test]
fn dropping_subscription_unsubscribes() {
    let registry = SubscriberRegistry::new();
    {
        let _sub = registry.subscribe_all(|_| {});
        assert_eq!(registry.catch_all_count(), 1);
    }
    assert_eq!(registry.catch_all_count(), 0);
}

#[test]
fn subscription_outliving_registry_is_harmless() {
    let registry = SubscriberRegistry::new();
    let sub = registry.subscribe("A", |_| {});
    drop(registry);
    assert!(!sub.is_active());
    sub.unsubscribe();
}

#[test]
fn inert_subscription_is_inactive() {
    let sub = Subscription::inert(Topic::Named("A".into()));
    assert!(!sub.is_active());
    assert_eq!(sub.id(), None);
    assert_eq!(sub.topic(), &Topic::Named("A".into()));
}

// =============================================================================
// dispatch routing
// =============================================================================

#[test]
fn topic_subscriber_receives_payload_exactly_once() {
    let registry = SubscriberRegistry::new();
    let received = Arc::new(Mutex::new(Vec::<Value>::new()));
    let other_hits = call_log();

    let sink = received.clone();
    let _orders = registry.subscribe("ORDER_CREATED", move |data| {
        sink.lock().expect("lock").push(data.clone());
    });
    let other_log = other_hits.clone();
    let _other = registry.subscribe("OTHER", move |_| push(&other_log, "other"));

    let report = registry.dispatch(&order_created());

    assert_eq!(
        *received.lock().expect("lock"),
        vec![json!({"type": "ORDER_CREATED", "id": "42"})]
    );
    assert!(entries(&other_hits).is_empty());
    assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
}

#[test]
fn catch_all_runs_before_topic_subscribers() {
    let registry = SubscriberRegistry::new();
    let log = call_log();

    // Topic subscriber registered first on purpose.
    let topic_log = log.clone();
    let _topic = registry.subscribe("ORDER_CREATED", move |_| push(&topic_log, "topic"));
    let envelope_log = log.clone();
    let _envelope = registry.subscribe("message", move |_| push(&envelope_log, "envelope"));
    let all_log = log.clone();
    let _all = registry.subscribe_all(move |event| push(&all_log, format!("all:{}", event.event_type)));

    registry.dispatch(&order_created());
    assert_eq!(entries(&log), vec!["all:message", "envelope", "topic"]);
}

#[test]
fn registration_order_is_preserved_within_groups() {
    let registry = SubscriberRegistry::new();
    let log = call_log();
    let mut subs = Vec::new();
    for i in 0..4 {
        let l = log.clone();
        subs.push(registry.subscribe_all(move |_| push(&l, format!("all{i}"))));
    }
    for i in 0..3 {
        let l = log.clone();
        subs.push(registry.subscribe("ORDER_CREATED", move |_| push(&l, format!("topic{i}"))));
    }

    registry.dispatch(&order_created());
    assert_eq!(
        entries(&log),
        vec!["all0", "all1", "all2", "all3", "topic0", "topic1", "topic2"]
    );
}

#[test]
fn payload_type_equal_to_envelope_is_delivered_once() {
    let registry = SubscriberRegistry::new();
    let log = call_log();
    let l = log.clone();
    let _sub = registry.subscribe("message", move |_| push(&l, "hit"));

    registry.dispatch(&NotificationEvent::message(json!({"type": "message"})));
    assert_eq!(entries(&log), vec!["hit"]);
}

#[test]
fn raw_text_event_reaches_catch_all_and_envelope_only() {
    let registry = SubscriberRegistry::new();
    let log = call_log();
    let all_log = log.clone();
    let _all = registry.subscribe_all(move |event| push(&all_log, event.data.to_string()));
    let topic_log = log.clone();
    let _topic = registry.subscribe("ORDER_CREATED", move |_| push(&topic_log, "topic"));

    registry.dispatch(&NotificationEvent::from_frame_body("not json"));
    assert_eq!(entries(&log), vec!["\"not json\""]);
}

#[test]
fn dispatch_without_subscribers_is_noop() {
    let registry = SubscriberRegistry::new();
    let report = registry.dispatch(&order_created());
    assert_eq!(report.invoked(), 0);
}

// =============================================================================
// subscriber isolation
// =============================================================================

#[test]
fn panicking_subscriber_does_not_block_sibling() {
    let registry = SubscriberRegistry::new();
    let log = call_log();

    let _first = registry.subscribe("ORDER_CREATED", |_| panic!("subscriber exploded"));
    let l = log.clone();
    let _second = registry.subscribe("ORDER_CREATED", move |_| push(&l, "second"));

    let report = registry.dispatch(&order_created());
    assert_eq!(entries(&log), vec!["second"]);
    assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
}

#[test]
fn panicking_catch_all_does_not_block_others_before_or_after() {
    let registry = SubscriberRegistry::new();
    let log = call_log();

    let before = log.clone();
    let _a = registry.subscribe_all(move |_| push(&before, "before"));
    let _b = registry.subscribe_all(|_| panic!("{}", String::from("owned panic message")));
    let after = log.clone();
    let _c = registry.subscribe_all(move |_| push(&after, "after"));
    let topic = log.clone();
    let _d = registry.subscribe("ORDER_CREATED", move |_| push(&topic, "topic"));

    let report = registry.dispatch(&order_created());
    assert_eq!(entries(&log), vec!["before", "after", "topic"]);
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 3);

    // Registry stays usable after a failure.
    let report = registry.dispatch(&order_created());
    assert_eq!(report.failed, 1);
}

#[test]
fn panic_message_handles_payload_kinds() {
    let static_payload: Box<dyn Any + Send> = Box::new("static");
    let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
    let other_payload: Box<dyn Any + Send> = Box::new(7_u8);
    assert_eq!(panic_message(static_payload.as_ref()), "static");
    assert_eq!(panic_message(owned_payload.as_ref()), "owned");
    assert_eq!(panic_message(other_payload.as_ref()), "non-string panic payload");
}

// =============================================================================
// re-entrancy
// =============================================================================

#[test]
fn callback_may_unsubscribe_itself_during_dispatch() {
    let registry = SubscriberRegistry::new();
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let hits = call_log();

    let slot_in_cb = slot.clone();
    let l = hits.clone();
    let sub = registry.subscribe("ORDER_CREATED", move |_| {
        push(&l, "hit");
        if let Some(sub) = slot_in_cb.lock().expect("slot").take() {
            sub.unsubscribe();
        }
    });
    *slot.lock().expect("slot") = Some(sub);

    registry.dispatch(&order_created());
    registry.dispatch(&order_created());
    assert_eq!(entries(&hits), vec!["hit"]);
    assert!(!registry.has_topic("ORDER_CREATED"));
}

#[test]
fn subscriber_added_during_dispatch_sees_next_event_only() {
    let registry = SubscriberRegistry::new();
    let log = call_log();
    let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

    let registry_in_cb = registry.clone();
    let added_in_cb = added.clone();
    let l = log.clone();
    let _adder = registry.subscribe_all(move |_| {
        let mut added = added_in_cb.lock().expect("added");
        if added.is_empty() {
            let inner_log = l.clone();
            added.push(registry_in_cb.subscribe_all(move |_| push(&inner_log, "late")));
        }
    });

    registry.dispatch(&order_created());
    assert!(entries(&log).is_empty());
    registry.dispatch(&order_created());
    assert_eq!(entries(&log), vec!["late"]);
}
