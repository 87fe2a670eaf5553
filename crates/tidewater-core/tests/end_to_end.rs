use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tidewater_core::cc::{build_scheduler, CcMode, CcScheduler, SchedulerConfig};
use tidewater_core::operator::Condition;
use tidewater_core::plan::{QueryBuilder, QueryContainer};
use tidewater_core::relation::{RelationRef, RelationUpdater};
use tidewater_core::schema::{Schema, SchemaRef};
use tidewater_core::stream::StreamRef;
use tidewater_core::tuple::{LogicalClock, Tuple, TupleRef};
use tidewater_core::value::{Comparator, Value, ValueType};
use tidewater_core::window::Window;
use tidewater_core::QueryProcessor;

const PURCHASES: usize = 1000;
const WIDTH: u64 = 5;
const WINDOWS: usize = PURCHASES / WIDTH as usize;
const PRICE: i64 = 250;

struct Shop {
    goods: RelationRef,
    purchases: StreamRef,
    schema: SchemaRef,
    clock: Arc<LogicalClock>,
    result: StreamRef,
}

impl Shop {
    fn purchase(&self, goods_id: i64) {
        let tuple = Tuple::new(
            Arc::clone(&self.schema),
            vec![Value::Int(goods_id)],
            self.clock.tick(),
        )
        .unwrap();
        self.purchases.enqueue(tuple);
    }

    fn close(&self) {
        self.purchases
            .enqueue(Tuple::end_of_stream(Arc::clone(&self.schema), self.clock.tick()));
    }
}

/// `avg_price = mean(purchases ⋈ goods)` over a tumbling window.
fn shop(mode: CcMode) -> (Shop, Box<dyn CcScheduler>) {
    let query: QueryContainer = QueryBuilder::new()
        .relation(
            "goods",
            Schema::of(&[("id", ValueType::Int), ("price", ValueType::Int)]),
        )
        .stream("purchases", Schema::of(&[("goods_id", ValueType::Int)]))
        .combine(
            "priced",
            "purchases",
            "goods",
            Condition::attributes("goods_id", Comparator::Eq, "id"),
        )
        .mean("avg_price", "priced", "price", Window::tuples(WIDTH, WIDTH))
        .build()
        .unwrap();

    let goods = Arc::clone(query.relation("goods").unwrap());
    for id in 0..10 {
        goods.insert(vec![Value::Int(id), Value::Int(PRICE)]).unwrap();
    }
    let shop = Shop {
        goods,
        purchases: Arc::clone(query.input_stream("purchases").unwrap()),
        schema: Arc::clone(query.operator("purchases").unwrap().schema()),
        clock: Arc::clone(query.clock()),
        result: Arc::clone(query.stream("avg_price").unwrap()),
    };
    let scheduler =
        build_scheduler(query.into_plan("avg_price").unwrap(), &SchedulerConfig::with_mode(mode))
            .unwrap();
    (shop, scheduler)
}

/// Runs the scheduler until every window was drained, or until end of
/// stream when `until_end` is set. Bumps the goods version every
/// `bump_every` wake-ups when given.
fn drive(
    shop: &Shop,
    scheduler: &mut dyn CcScheduler,
    bump_every: Option<u64>,
    until_end: bool,
) -> Vec<TupleRef> {
    let mut results = Vec::new();
    for wake in 1..=1_000_000u64 {
        scheduler.wake_up().unwrap();
        if bump_every.is_some_and(|n| wake % n == 0) {
            shop.goods.update(|_| ());
        }
        while let Some(t) = shop.result.try_dequeue() {
            let end = t.is_end_of_stream();
            results.push(t);
            if end {
                return results;
            }
        }
        if !until_end && results.len() == WINDOWS {
            return results;
        }
    }
    panic!("query did not finish, {} results", results.len());
}

#[test]
fn optimistic_stable_relation_is_always_consistent() {
    let (shop, mut scheduler) = shop(CcMode::Optimistic);
    for i in 0..PURCHASES {
        shop.purchase(i64::try_from(i % 10).unwrap());
    }

    let results = drive(&shop, scheduler.as_mut(), None, false);
    assert_eq!(results.len(), WINDOWS);
    assert!(results
        .iter()
        .all(|t| t.value(0) == Some(&Value::Float(250.0))));
    assert_eq!(scheduler.redo_counts(), 0);
    assert_eq!(scheduler.consistent_rate(), Some(1.0));
}

#[test]
fn optimistic_updates_force_redo() {
    let (shop, mut scheduler) = shop(CcMode::Optimistic);
    for i in 0..PURCHASES {
        shop.purchase(i64::try_from(i % 10).unwrap());
    }

    let results = drive(&shop, scheduler.as_mut(), Some(40), false);
    // Every window is eventually emitted exactly once.
    assert_eq!(results.len(), WINDOWS);
    assert!(scheduler.redo_counts() > 0);
    let rate = scheduler.consistent_rate().unwrap();
    assert!(rate < 1.0, "rate {rate}");
    assert_eq!(scheduler.metrics().commits, WINDOWS as u64);
}

#[test]
fn without_cc_emits_inconsistent_windows() {
    let (shop, mut scheduler) = shop(CcMode::None);
    for i in 0..PURCHASES {
        shop.purchase(i64::try_from(i % 10).unwrap());
    }

    let results = drive(&shop, scheduler.as_mut(), Some(40), false);
    assert_eq!(results.len(), WINDOWS);
    assert_eq!(scheduler.redo_counts(), 0);
    assert!(scheduler.consistent_rate().unwrap() < 1.0);
}

#[test]
fn pessimistic_protocols_close_every_window() {
    for mode in [CcMode::TwoPhaseLocking, CcMode::Snapshot] {
        let (shop, mut scheduler) = shop(mode);
        for i in 0..PURCHASES {
            shop.purchase(i64::try_from(i % 10).unwrap());
        }
        shop.close();

        let results = drive(&shop, scheduler.as_mut(), None, true);
        assert_eq!(results.len(), WINDOWS + 1, "{mode}");
        assert!(results[WINDOWS].is_end_of_stream());
        let metrics = scheduler.metrics();
        assert_eq!(metrics.commits, WINDOWS as u64, "{mode}");
        // End of stream closes the last transaction.
        assert_eq!(metrics.after_commits, WINDOWS as u64, "{mode}");
        assert_eq!(scheduler.consistent_rate(), Some(1.0));
        drop(scheduler);
        assert!(!shop.goods.is_locked());
    }
}

/// Feeds purchases from a sender thread every `gap` while an updater bumps
/// the goods version every millisecond. Returns the drained results, the
/// number of updates and the stopped scheduler.
fn threaded_run(mode: CcMode, gap: Duration) -> (Vec<TupleRef>, u64, Box<dyn CcScheduler>) {
    let (shop, scheduler) = shop(mode);
    let shop = Arc::new(shop);

    let updater = RelationUpdater::new(
        Arc::clone(&shop.goods),
        Duration::from_millis(1),
        Duration::from_micros(10),
    );
    let stop_updater = updater.stop_handle();
    let updater = updater.spawn(|_| {});

    let processor = QueryProcessor::new(scheduler);
    let stop_processor = processor.stop_handle();
    let processor = processor.spawn();

    let sender = {
        let shop = Arc::clone(&shop);
        thread::spawn(move || {
            for i in 0..PURCHASES {
                shop.purchase(i64::try_from(i % 10).unwrap());
                thread::sleep(gap);
            }
            shop.close();
        })
    };

    let mut results = Vec::new();
    loop {
        let tuple = shop
            .result
            .dequeue_timeout(Duration::from_secs(30))
            .expect("result stream stalled");
        let end = tuple.is_end_of_stream();
        results.push(tuple);
        if end {
            break;
        }
    }

    sender.join().unwrap();
    stop_updater.store(true, Ordering::Release);
    let updates = updater.join().unwrap();
    stop_processor.store(true, Ordering::Release);
    let processor = processor.join().unwrap().unwrap();
    assert!(processor.wake_ups() > 0);
    (results, updates, processor.into_scheduler())
}

#[test]
fn threaded_optimistic_with_updater() {
    let (results, updates, scheduler) = threaded_run(CcMode::Optimistic, Duration::from_millis(1));
    assert_eq!(results.len(), WINDOWS + 1);
    assert!(updates > 0);
    assert!(scheduler.redo_counts() > 0);
    assert!(scheduler.consistent_rate().unwrap() < 1.0);
}

#[test]
fn threaded_two_phase_locking_with_updater() {
    let (results, updates, scheduler) =
        threaded_run(CcMode::TwoPhaseLocking, Duration::from_micros(200));
    assert_eq!(results.len(), WINDOWS + 1);
    assert!(updates > 0);
    // Reads of one window all happen under the same lock.
    assert_eq!(scheduler.consistent_rate(), Some(1.0));
    assert_eq!(scheduler.redo_counts(), 0);
}
