//! Multi-level driver.
//!
//! Levels are ordered coarsest first. Every coarse bar pulls the finer bars
//! up to its timestamp before the next coarse bar is read, depth first, so a
//! parent is never sealed before its children.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, info, warn};

use chan_core::{
    Bar, BarSource, ChanError, ChanResult, SourceProvider, Timeframe, Warning,
};

use crate::config::ChanConfig;
use crate::level::Level;
use crate::snapshot::Snapshot;

/// Read side of one level.
#[derive(Default)]
struct Feed {
    source: Option<Box<dyn BarSource>>,
    /// Bar read from the source but belonging to a later parent
    pending: Option<Bar>,
    /// Pushed bars, read once the source is exhausted
    queued: VecDeque<Bar>,
}

/// Structure engine over an ordered set of timeframes.
pub struct Chan {
    config: ChanConfig,
    levels: Vec<Level>,
    feeds: Vec<Feed>,
    warnings: Vec<Warning>,
    /// Parent bars without children, all levels
    misaligned: usize,
    /// Parent timestamp -> children on another date, all levels
    inconsistent: BTreeMap<i64, Vec<i64>>,
    steps: usize,
}

impl Chan {
    /// Create a driver for `timeframes`, coarsest first.
    pub fn new(config: ChanConfig, timeframes: &[Timeframe]) -> ChanResult<Self> {
        config.validate()?;
        if timeframes.is_empty() {
            return Err(ChanError::Config("at least one timeframe is required".into()));
        }
        if let Some(pair) = timeframes.windows(2).find(|w| w[0] <= w[1]) {
            return Err(ChanError::Config(format!(
                "timeframes must be ordered coarsest first, got {} before {}",
                pair[0], pair[1]
            )));
        }
        let levels = timeframes.iter().map(|tf| Level::new(*tf, &config)).collect();
        let feeds = timeframes.iter().map(|_| Feed::default()).collect();
        Ok(Self {
            config,
            levels,
            feeds,
            warnings: Vec::new(),
            misaligned: 0,
            inconsistent: BTreeMap::new(),
            steps: 0,
        })
    }

    /// Open one source per level.
    ///
    /// A finer level whose source fails is dropped when
    /// `alignment.auto_drop_sub_level` is set.
    pub fn open(&mut self, provider: &dyn SourceProvider) -> ChanResult<()> {
        let mut lv = 0;
        while lv < self.levels.len() {
            let timeframe = self.levels[lv].timeframe();
            match provider.open(timeframe) {
                Ok(source) => {
                    debug!(%timeframe, source = source.name(), "source opened");
                    self.feeds[lv].source = Some(source);
                    lv += 1;
                }
                Err(err) if lv == 0 => return Err(err.into()),
                Err(err) if self.config.alignment.auto_drop_sub_level => {
                    warn!(%timeframe, error = %err, "dropping unavailable sub-level");
                    self.warnings.push(Warning::LevelDropped {
                        timeframe,
                        reason: err.to_string(),
                    });
                    self.levels.remove(lv);
                    self.feeds.remove(lv);
                }
                Err(source) => {
                    return Err(ChanError::SubLevelUnavailable { timeframe, source });
                }
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.levels.iter().map(Level::timeframe).collect()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, timeframe: Timeframe) -> Option<&Level> {
        self.levels.iter().find(|l| l.timeframe() == timeframe)
    }

    /// Warnings accumulated so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Coarsest-level bars consumed so far.
    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Consume one coarsest-level bar with its children and return the
    /// resulting snapshot, or `None` once the coarsest source is exhausted.
    pub fn step(&mut self) -> ChanResult<Option<Snapshot>> {
        if !self.advance()? {
            return Ok(None);
        }
        self.recompute()?;
        Ok(Some(self.snapshot()))
    }

    /// Replay iterator yielding one snapshot per coarsest-level bar after the
    /// first `replay.skip_steps`.
    pub fn steps(&mut self) -> Steps<'_> {
        Steps {
            chan: self,
            done: false,
        }
    }

    /// Consume every source to exhaustion.
    pub fn drain(&mut self) -> ChanResult<Snapshot> {
        while self.advance()? {}
        self.recompute()?;
        self.log_summary();
        Ok(self.snapshot())
    }

    /// Feed caller-supplied bars.
    ///
    /// `bars` must hold the coarsest level; finer levels are optional. The
    /// bars are queued behind anything still unread, so finer bars past the
    /// last coarse bar wait for a later push.
    pub fn push(&mut self, mut bars: HashMap<Timeframe, Vec<Bar>>) -> ChanResult<Snapshot> {
        if let Some(unknown) = bars.keys().find(|tf| self.level(**tf).is_none()) {
            return Err(ChanError::Config(format!("no level configured for {}", unknown)));
        }
        let top = self.levels[0].timeframe();
        if bars.get(&top).map_or(true, Vec::is_empty) {
            return Err(ChanError::NoData(top));
        }
        for (level, feed) in self.levels.iter().zip(self.feeds.iter_mut()) {
            if let Some(supplied) = bars.remove(&level.timeframe()) {
                feed.queued.extend(supplied);
            }
        }
        while self.advance()? {}
        self.recompute()?;
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.steps, &self.levels)
    }

    /// Read one coarse bar and everything under it. Returns false once the
    /// coarsest source is exhausted.
    fn advance(&mut self) -> ChanResult<bool> {
        let Some(bar) = self.take(0)? else {
            if self.steps == 0 && self.levels[0].bars().is_empty() {
                return Err(ChanError::NoData(self.levels[0].timeframe()));
            }
            return Ok(false);
        };
        let idx = self.levels[0].push_bar(bar)?;
        self.feed_children(0, idx, bar)?;
        self.steps += 1;
        Ok(true)
    }

    fn peek(&mut self, lv: usize) -> ChanResult<Option<Bar>> {
        let feed = &mut self.feeds[lv];
        if feed.pending.is_none() {
            if let Some(source) = feed.source.as_mut() {
                feed.pending = source.next_bar()?;
            }
            if feed.pending.is_none() {
                feed.pending = feed.queued.pop_front();
            }
        }
        Ok(feed.pending)
    }

    fn take(&mut self, lv: usize) -> ChanResult<Option<Bar>> {
        self.peek(lv)?;
        Ok(self.feeds[lv].pending.take())
    }

    /// Attach every bar of level `lv + 1` up to the parent's timestamp, then
    /// run the alignment checks for the parent.
    fn feed_children(&mut self, lv: usize, parent: usize, parent_bar: Bar) -> ChanResult<()> {
        let child = lv + 1;
        if child >= self.levels.len() {
            return Ok(());
        }
        let parent_date = self.levels[lv].bars()[parent].date();
        let check_dates = self.levels[lv].timeframe().is_daily_or_finer()
            && self.levels[child].timeframe().is_daily_or_finer();
        let mut off_date = Vec::new();

        while let Some(bar) = self.peek(child)? {
            if bar.timestamp > parent_bar.timestamp {
                break;
            }
            self.feeds[child].pending = None;
            let idx = self.levels[child].push_bar(bar)?;
            self.levels[child].link_parent(idx, parent);
            self.levels[lv].link_child(parent, idx);
            if check_dates && self.levels[child].bars()[idx].date() != parent_date {
                off_date.push(bar.timestamp);
            }
            self.feed_children(child, idx, bar)?;
        }

        if self.config.alignment.check {
            self.check_alignment(lv, parent, parent_bar.timestamp, off_date)?;
        }
        Ok(())
    }

    fn check_alignment(
        &mut self,
        lv: usize,
        parent: usize,
        parent_time: i64,
        off_date: Vec<i64>,
    ) -> ChanResult<()> {
        let child = lv + 1;
        let timeframe = self.levels[child].timeframe();
        let limits = self.config.alignment;

        if self.levels[lv].children_of(parent).is_empty() {
            self.misaligned += 1;
            warn!(%timeframe, parent_time, count = self.misaligned, "parent bar without children");
            self.warnings.push(Warning::Misaligned {
                timeframe,
                parent_time,
            });
            if self.misaligned >= limits.max_misaligned {
                return Err(ChanError::Misaligned {
                    timeframe,
                    count: self.misaligned,
                    limit: limits.max_misaligned,
                });
            }
        }

        if !off_date.is_empty() {
            self.inconsistent
                .entry(parent_time)
                .or_default()
                .extend_from_slice(&off_date);
            let count = self.inconsistent.len();
            warn!(%timeframe, parent_time, children = off_date.len(), "children on another date");
            self.warnings.push(Warning::DateInconsistent {
                timeframe,
                parent_time,
                child_times: off_date,
            });
            if count >= limits.max_inconsistent {
                return Err(ChanError::DateInconsistent {
                    count,
                    limit: limits.max_inconsistent,
                });
            }
        }
        Ok(())
    }

    /// Bring every level up to date, finest first.
    fn recompute(&mut self) -> ChanResult<()> {
        for level in self.levels.iter_mut().rev() {
            level.recompute()?;
        }
        Ok(())
    }

    fn log_summary(&self) {
        for level in &self.levels {
            info!(
                timeframe = %level.timeframe(),
                bars = level.bars().len(),
                merged = level.merged().len(),
                strokes = level.strokes().len(),
                segments = level.segments().len(),
                zones = level.stroke_zones().len(),
                signals = level.stroke_signals().len(),
                "level loaded"
            );
        }
        if !self.warnings.is_empty() {
            info!(warnings = self.warnings.len(), "load finished with warnings");
        }
    }
}

/// Snapshot iterator returned by [`Chan::steps`]. Stops after the first
/// error.
pub struct Steps<'a> {
    chan: &'a mut Chan,
    done: bool,
}

impl Iterator for Steps<'_> {
    type Item = ChanResult<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let skip = self.chan.config.replay.skip_steps;
        loop {
            match self.chan.advance() {
                Ok(true) if self.chan.steps <= skip => continue,
                Ok(true) => {
                    return Some(self.chan.recompute().map(|_| self.chan.snapshot()));
                }
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chan_core::{DataError, VecSource};

    fn daily(day: i64, price: f64) -> Bar {
        Bar::new(day * 86_400_000, price, price + 1.0, price - 1.0, price)
    }

    struct Provider(HashMap<Timeframe, Vec<Bar>>);

    impl SourceProvider for Provider {
        fn open(&self, timeframe: Timeframe) -> Result<Box<dyn BarSource>, DataError> {
            self.0
                .get(&timeframe)
                .map(|bars| {
                    Box::new(VecSource::new(timeframe.to_string(), bars.clone()))
                        as Box<dyn BarSource>
                })
                .ok_or_else(|| DataError::NotFound(timeframe.to_string()))
        }
    }

    #[test]
    fn test_rejects_fine_to_coarse_order() {
        let err = Chan::new(ChanConfig::default(), &[Timeframe::Hour1, Timeframe::Daily])
            .err()
            .unwrap();
        assert!(matches!(err, ChanError::Config(_)));
        assert!(Chan::new(ChanConfig::default(), &[]).is_err());
    }

    #[test]
    fn test_empty_top_level_is_no_data() {
        let mut chan = Chan::new(ChanConfig::default(), &[Timeframe::Daily]).unwrap();
        chan.open(&Provider(HashMap::from([(Timeframe::Daily, vec![])])))
            .unwrap();
        assert!(matches!(chan.drain(), Err(ChanError::NoData(Timeframe::Daily))));
    }

    #[test]
    fn test_missing_sub_level() {
        let provider = Provider(HashMap::from([(Timeframe::Daily, vec![daily(1, 10.0)])]));
        let mut chan = Chan::new(ChanConfig::default(), &[Timeframe::Daily, Timeframe::Hour1])
            .unwrap();
        let err = chan.open(&provider).unwrap_err();
        assert!(matches!(
            err,
            ChanError::SubLevelUnavailable {
                timeframe: Timeframe::Hour1,
                ..
            }
        ));

        let mut config = ChanConfig::default();
        config.alignment.auto_drop_sub_level = true;
        let mut chan = Chan::new(config, &[Timeframe::Daily, Timeframe::Hour1]).unwrap();
        chan.open(&provider).unwrap();
        assert_eq!(chan.timeframes(), vec![Timeframe::Daily]);
        assert!(matches!(chan.warnings()[0], Warning::LevelDropped { .. }));
    }

    #[test]
    fn test_step_counts_coarse_bars() {
        let bars: Vec<Bar> = (1..=5).map(|d| daily(d, 10.0 + d as f64)).collect();
        let mut chan = Chan::new(ChanConfig::default(), &[Timeframe::Daily]).unwrap();
        chan.open(&Provider(HashMap::from([(Timeframe::Daily, bars)])))
            .unwrap();
        let mut seen = Vec::new();
        while let Some(snapshot) = chan.step().unwrap() {
            seen.push(snapshot.step);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(chan.levels()[0].bars().len(), 5);
    }

    #[test]
    fn test_steps_skip() {
        let bars: Vec<Bar> = (1..=5).map(|d| daily(d, 10.0 + d as f64)).collect();
        let mut config = ChanConfig::default();
        config.replay.skip_steps = 3;
        let mut chan = Chan::new(config, &[Timeframe::Daily]).unwrap();
        chan.open(&Provider(HashMap::from([(Timeframe::Daily, bars)])))
            .unwrap();
        let steps: Vec<usize> = chan.steps().map(|s| s.unwrap().step).collect();
        assert_eq!(steps, vec![4, 5]);
    }

    #[test]
    fn test_push_rejects_unknown_level() {
        let mut chan = Chan::new(ChanConfig::default(), &[Timeframe::Daily]).unwrap();
        let err = chan
            .push(HashMap::from([(Timeframe::Hour1, vec![daily(1, 10.0)])]))
            .unwrap_err();
        assert!(matches!(err, ChanError::Config(_)));
        let err = chan.push(HashMap::new()).unwrap_err();
        assert!(matches!(err, ChanError::NoData(Timeframe::Daily)));
    }
}
