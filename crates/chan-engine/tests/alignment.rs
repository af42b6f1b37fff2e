//! Parent/child alignment across levels.

use std::collections::HashMap;

use chan_core::{Bar, BarSource, ChanError, DataError, SourceProvider, Timeframe, VecSource, Warning};
use chan_engine::{Chan, ChanConfig};

const HOUR: i64 = 3_600_000;
const DAY: i64 = 24 * HOUR;

fn bar(ts: i64, price: f64) -> Bar {
    Bar::new(ts, price, price + 0.5, price - 0.5, price)
}

/// Daily bars closing at 15:00.
fn days(range: std::ops::RangeInclusive<i64>) -> Vec<Bar> {
    range
        .map(|d| bar(d * DAY + 15 * HOUR, 20.0 + 4.0 * (d as f64 * 0.7).sin()))
        .collect()
}

/// Hourly bars 10:00 to 15:00 of each day.
fn hours(range: std::ops::RangeInclusive<i64>) -> Vec<Bar> {
    range
        .flat_map(|d| {
            (10..=15).map(move |h| {
                let t = (d * 6 + h) as f64;
                bar(d * DAY + h * HOUR, 20.0 + 4.0 * (t * 0.45).sin())
            })
        })
        .collect()
}

struct Memory(HashMap<Timeframe, Vec<Bar>>);

impl SourceProvider for Memory {
    fn open(&self, timeframe: Timeframe) -> Result<Box<dyn BarSource>, DataError> {
        match self.0.get(&timeframe) {
            Some(bars) => Ok(Box::new(VecSource::new(timeframe.to_string(), bars.clone()))),
            None => Err(DataError::NotFound(timeframe.to_string())),
        }
    }
}

fn load(config: ChanConfig, daily: Vec<Bar>, hourly: Vec<Bar>) -> (Chan, Result<(), ChanError>) {
    let mut chan = Chan::new(config, &[Timeframe::Daily, Timeframe::Hour1]).unwrap();
    chan.open(&Memory(HashMap::from([
        (Timeframe::Daily, daily),
        (Timeframe::Hour1, hourly),
    ])))
    .unwrap();
    let result = chan.drain().map(|_| ());
    (chan, result)
}

#[test]
fn children_attach_to_their_day() {
    let (chan, result) = load(ChanConfig::default(), days(1..=3), hours(1..=3));
    result.unwrap();
    let daily = chan.level(Timeframe::Daily).unwrap();
    let hourly = chan.level(Timeframe::Hour1).unwrap();
    assert_eq!(hourly.bars().len(), 18);
    for parent in 0..3 {
        let children = daily.children_of(parent);
        assert_eq!(children.len(), 6);
        for &child in children {
            assert_eq!(hourly.parent_of(child), Some(parent));
        }
    }
    assert!(chan.warnings().is_empty());
}

#[test]
fn trailing_children_wait_for_their_parent() {
    let mut chan = Chan::new(ChanConfig::default(), &[Timeframe::Daily, Timeframe::Hour1]).unwrap();
    chan.push(HashMap::from([
        (Timeframe::Daily, days(1..=1)),
        (Timeframe::Hour1, hours(1..=2)),
    ]))
    .unwrap();
    assert_eq!(chan.level(Timeframe::Hour1).unwrap().bars().len(), 6);

    chan.push(HashMap::from([(Timeframe::Daily, days(2..=2))]))
        .unwrap();
    let daily = chan.level(Timeframe::Daily).unwrap();
    assert_eq!(chan.level(Timeframe::Hour1).unwrap().bars().len(), 12);
    assert_eq!(daily.children_of(1).len(), 6);
}

#[test]
fn missing_children_warn_then_fail() {
    let hourly: Vec<Bar> = hours(1..=4)
        .into_iter()
        .filter(|b| b.timestamp / DAY != 2)
        .collect();
    let (chan, result) = load(ChanConfig::default(), days(1..=4), hourly.clone());
    result.unwrap();
    assert_eq!(
        chan.warnings(),
        &[Warning::Misaligned {
            timeframe: Timeframe::Hour1,
            parent_time: 2 * DAY + 15 * HOUR,
        }]
    );

    let hourly: Vec<Bar> = hourly.into_iter().filter(|b| b.timestamp / DAY != 3).collect();
    let (_, result) = load(ChanConfig::default(), days(1..=4), hourly);
    assert!(matches!(
        result,
        Err(ChanError::Misaligned {
            count: 2,
            limit: 2,
            ..
        })
    ));
}

#[test]
fn disabled_check_ignores_missing_children() {
    let mut config = ChanConfig::default();
    config.alignment.check = false;
    let (chan, result) = load(config, days(1..=4), hours(1..=1));
    result.unwrap();
    assert!(chan.warnings().is_empty());
    assert_eq!(chan.level(Timeframe::Daily).unwrap().bars().len(), 4);
}

#[test]
fn children_on_another_date_are_reported() {
    // evening bars of day 1 fall under the day-2 parent
    let mut hourly = hours(1..=3);
    hourly.insert(6, bar(DAY + 20 * HOUR, 11.0));
    hourly.insert(7, bar(DAY + 21 * HOUR, 11.1));
    let (chan, result) = load(ChanConfig::default(), days(1..=3), hourly);
    result.unwrap();
    assert_eq!(
        chan.warnings(),
        &[Warning::DateInconsistent {
            timeframe: Timeframe::Hour1,
            parent_time: 2 * DAY + 15 * HOUR,
            child_times: vec![DAY + 20 * HOUR, DAY + 21 * HOUR],
        }]
    );
    assert_eq!(chan.level(Timeframe::Daily).unwrap().children_of(1).len(), 8);
}

#[test]
fn date_inconsistency_limit_is_fatal() {
    let mut config = ChanConfig::default();
    config.alignment.max_inconsistent = 1;
    let mut hourly = hours(1..=2);
    hourly.insert(6, bar(DAY + 20 * HOUR, 11.0));
    let (_, result) = load(config, days(1..=2), hourly);
    assert!(matches!(
        result,
        Err(ChanError::DateInconsistent { count: 1, limit: 1 })
    ));
}

#[test]
fn batch_and_push_agree_across_levels() {
    let daily = days(1..=30);
    let hourly = hours(1..=30);
    let (batch, result) = load(ChanConfig::default(), daily.clone(), hourly.clone());
    result.unwrap();

    let mut pushed =
        Chan::new(ChanConfig::default(), &[Timeframe::Daily, Timeframe::Hour1]).unwrap();
    for (d, parent) in daily.iter().enumerate() {
        let children = hourly[d * 6..d * 6 + 6].to_vec();
        pushed
            .push(HashMap::from([
                (Timeframe::Daily, vec![*parent]),
                (Timeframe::Hour1, children),
            ]))
            .unwrap();
    }
    for tf in [Timeframe::Daily, Timeframe::Hour1] {
        let a = batch.level(tf).unwrap();
        let b = pushed.level(tf).unwrap();
        assert_eq!(a.bars(), b.bars());
        assert_eq!(a.strokes(), b.strokes());
        assert_eq!(a.segments(), b.segments());
        assert_eq!(a.stroke_zones(), b.stroke_zones());
        assert_eq!(a.stroke_signals(), b.stroke_signals());
    }
}
