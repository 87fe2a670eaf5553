//! The purchase/goods experiment.
//!
//! A stream of purchases is joined with a goods relation and averaged over
//! a tumbling window while an updater keeps repricing goods. Four threads
//! run concurrently: the sender, the relation updater, the query processor
//! and the consumer (the calling thread).

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use rand::Rng;
use tracing::{debug, info};

use tidewater_core::cc::{build_scheduler, CcMode, SchedulerConfig, SchedulerMetrics};
use tidewater_core::operator::Condition;
use tidewater_core::plan::{QueryBuilder, QueryContainer};
use tidewater_core::relation::{RelationState, RelationUpdater};
use tidewater_core::schema::{Schema, SchemaRef};
use tidewater_core::tuple::Tuple;
use tidewater_core::value::{Comparator, Value, ValueType};
use tidewater_core::window::Window;
use tidewater_core::QueryProcessor;

const GOODS: &str = "goods";
const PURCHASES: &str = "purchases";
const RESULT: &str = "avg_price";

/// How long the consumer waits before checking on the processor.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parameters of one experiment run.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Concurrency-control protocol.
    pub mode: CcMode,
    /// Commits joined into one pessimistic transaction.
    pub txn_joint_count: usize,
    /// Evaluations per scheduler wake-up.
    pub batch_count: usize,
    /// Pause between relation updates.
    pub update_interval: Duration,
    /// How long each update holds the relation lock.
    pub update_time: Duration,
    /// Pause between purchases.
    pub purchase_interval: Duration,
    /// Number of purchases to send.
    pub purchase_count: usize,
    /// Number of goods rows.
    pub goods_count: i64,
    /// Lowest goods price, inclusive.
    pub min_price: i64,
    /// Highest goods price, exclusive.
    pub max_price: i64,
    /// Window width in tuples.
    pub window_width: u64,
    /// Window stride in tuples.
    pub window_stride: u64,
}

impl ExperimentConfig {
    fn validate(&self) -> Result<()> {
        if self.goods_count <= 0 {
            bail!("goods count must be positive, got {}", self.goods_count);
        }
        if self.min_price >= self.max_price {
            bail!(
                "min price {} must be below max price {}",
                self.min_price,
                self.max_price
            );
        }
        Ok(())
    }

    fn window(&self) -> Window {
        Window::tuples(self.window_width, self.window_stride)
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct Report {
    /// Protocol used.
    pub mode: CcMode,
    /// Commit window.
    pub window: Window,
    /// Purchases sent.
    pub purchases: usize,
    /// Averages received.
    pub results: usize,
    /// Time from start until end of stream reached the consumer.
    pub elapsed: Duration,
    /// Relation updates applied.
    pub updates: u64,
    /// Pause between relation updates.
    pub update_interval: Duration,
    /// Redone windows.
    pub redo_count: u64,
    /// Consistent share of evaluated windows.
    pub consistent_rate: Option<f64>,
    /// Scheduler counters.
    pub metrics: SchedulerMetrics,
}

impl fmt::Display for Report {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64().max(f64::EPSILON);
        writeln!(f, "Method: {}", self.mode)?;
        writeln!(f, "Window: {}", self.window)?;
        writeln!(f, "Events: {}", self.purchases)?;
        writeln!(f, "Results: {}", self.results)?;
        writeln!(f, "Elapsed: {secs:.3} secs")?;
        if !self.update_interval.is_zero() {
            writeln!(
                f,
                "Update Rate: {:.1} qps",
                1.0 / self.update_interval.as_secs_f64()
            )?;
        }
        writeln!(f, "Query Throughput: {:.1} tps", self.purchases as f64 / secs)?;
        writeln!(f, "Update Throughput: {:.1} qps", self.updates as f64 / secs)?;
        if self.mode == CcMode::Optimistic {
            writeln!(f, "Redo: {} times", self.redo_count)?;
        }
        if let Some(rate) = self.consistent_rate {
            writeln!(f, "Consistent Rate: {rate:.4}")?;
        }
        write!(
            f,
            "Steps: {} ({} idle), Commits: {}, Transactions: {}",
            self.metrics.steps,
            self.metrics.idle_steps,
            self.metrics.commits,
            self.metrics.after_commits
        )
    }
}

/// A built query with its goods loaded, ready to run or render.
#[derive(Debug)]
pub struct Experiment {
    config: ExperimentConfig,
    query: QueryContainer,
}

impl Experiment {
    /// Builds `avg_price = mean(purchases ⋈ goods)` and loads the goods.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let query = QueryBuilder::new()
            .relation(
                GOODS,
                Schema::of(&[("id", ValueType::Int), ("price", ValueType::Int)]),
            )
            .stream(
                PURCHASES,
                Schema::of(&[("goods_id", ValueType::Int), ("amount", ValueType::Int)]),
            )
            .combine(
                "priced",
                PURCHASES,
                GOODS,
                Condition::attributes("goods_id", Comparator::Eq, "id"),
            )
            .mean(RESULT, "priced", "price", config.window())
            .build()
            .context("failed to build query")?;

        let goods = query
            .relation(GOODS)
            .ok_or_else(|| anyhow!("relation {GOODS} missing"))?;
        let mut rng = rand::thread_rng();
        for id in 0..config.goods_count {
            let price = rng.gen_range(config.min_price..config.max_price);
            goods.insert(vec![Value::Int(id), Value::Int(price)])?;
        }
        debug!(goods = config.goods_count, "goods loaded");

        Ok(Self { config, query })
    }

    /// Renders the query plan in Graphviz DOT format.
    ///
    /// # Errors
    ///
    /// Returns an error if the result operator is missing.
    pub fn to_dot(self) -> Result<String> {
        Ok(self.query.into_plan(RESULT)?.to_dot())
    }

    /// Runs the experiment until end of stream reaches the consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if scheduling fails or a worker thread panics.
    pub fn run(self) -> Result<Report> {
        let Self { config, query } = self;

        let goods = Arc::clone(
            query
                .relation(GOODS)
                .ok_or_else(|| anyhow!("relation {GOODS} missing"))?,
        );
        let input = Arc::clone(
            query
                .input_stream(PURCHASES)
                .ok_or_else(|| anyhow!("stream {PURCHASES} missing"))?,
        );
        let result = Arc::clone(
            query
                .stream(RESULT)
                .ok_or_else(|| anyhow!("stream {RESULT} missing"))?,
        );
        let purchase_schema = Arc::clone(
            query
                .operator(PURCHASES)
                .ok_or_else(|| anyhow!("operator {PURCHASES} missing"))?
                .schema(),
        );
        let clock = Arc::clone(query.clock());

        let scheduler_config = SchedulerConfig::builder()
            .mode(config.mode)
            .txn_joint_count(config.txn_joint_count)
            .batch_count(config.batch_count)
            .build();
        let scheduler = build_scheduler(query.into_plan(RESULT)?, &scheduler_config)
            .context("failed to build scheduler")?;

        info!(
            mode = %config.mode,
            purchases = config.purchase_count,
            window = %config.window(),
            "starting experiment"
        );

        let updater = RelationUpdater::new(
            Arc::clone(&goods),
            config.update_interval,
            config.update_time,
        );
        let stop_updater = updater.stop_handle();
        let updater = updater.spawn(repricer(
            Arc::clone(goods.schema()),
            config.goods_count,
            config.min_price,
            config.max_price,
        ));

        let processor = QueryProcessor::new(scheduler);
        let stop_processor = processor.stop_handle();
        let processor = processor.spawn();

        let started = Instant::now();
        let sender = {
            let (count, goods_count, interval) =
                (config.purchase_count, config.goods_count, config.purchase_interval);
            thread::spawn(move || -> Result<()> {
                let mut rng = rand::thread_rng();
                for i in 0..count {
                    let goods_id = i64::try_from(i)? % goods_count;
                    let amount = rng.gen_range(1..=10);
                    let tuple = Tuple::new(
                        Arc::clone(&purchase_schema),
                        vec![Value::Int(goods_id), Value::Int(amount)],
                        clock.tick(),
                    )?;
                    input.enqueue(tuple);
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                input.enqueue(Tuple::end_of_stream(purchase_schema, clock.tick()));
                Ok(())
            })
        };

        let mut results = 0usize;
        loop {
            if let Some(tuple) = result.dequeue_timeout(POLL_INTERVAL) {
                if tuple.is_end_of_stream() {
                    break;
                }
                results += 1;
            } else if processor.is_finished() {
                // The processor only stops on its own when it failed.
                break;
            }
        }
        let elapsed = started.elapsed();

        stop_processor.store(true, Ordering::Release);
        let processed = processor
            .join()
            .map_err(|_| anyhow!("query processor thread panicked"))
            .and_then(|result| result.context("query processing failed"))
            .map(|processor| {
                // Dropping the scheduler releases any relation lock still held
                // by an open transaction, which the updater may be waiting on.
                let scheduler = processor.into_scheduler();
                (
                    scheduler.redo_counts(),
                    scheduler.consistent_rate(),
                    scheduler.metrics(),
                )
            });

        stop_updater.store(true, Ordering::Release);
        let updates = updater
            .join()
            .map_err(|_| anyhow!("updater thread panicked"))?;
        sender
            .join()
            .map_err(|_| anyhow!("sender thread panicked"))??;
        let (redo_count, consistent_rate, metrics) = processed?;

        Ok(Report {
            mode: config.mode,
            window: config.window(),
            purchases: config.purchase_count,
            results,
            elapsed,
            updates,
            update_interval: config.update_interval,
            redo_count,
            consistent_rate,
            metrics,
        })
    }
}

/// Mutation applied by the updater: reprices one random goods row.
fn repricer(
    schema: SchemaRef,
    goods_count: i64,
    min_price: i64,
    max_price: i64,
) -> impl FnMut(&mut RelationState) + Send + 'static {
    move |state: &mut RelationState| {
        let mut rng = rand::thread_rng();
        let id = rng.gen_range(0..goods_count);
        let price = rng.gen_range(min_price..max_price);
        let Ok(row) = Tuple::new(
            Arc::clone(&schema),
            vec![Value::Int(id), Value::Int(price)],
            0,
        ) else {
            return;
        };
        if let Some(slot) = usize::try_from(id)
            .ok()
            .and_then(|i| state.tuples_mut().get_mut(i))
        {
            *slot = row;
        }
    }
}
