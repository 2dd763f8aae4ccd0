use bms_etl::cleaning::{FrozenDetector, Resampler};
use bms_etl::{Column, HeaderScanner, TimeSeriesFrame};
use chrono::{Duration, NaiveDate};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

/// One week of one-minute readings for a handful of plant sensors
fn week_of_minutes() -> TimeSeriesFrame {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let rows = 7 * 24 * 60;
    let timestamps = (0..rows)
        .map(|i| Some(start + Duration::minutes(i as i64)))
        .collect();
    let wave = |offset: f64| -> Vec<Option<f64>> {
        (0..rows)
            .map(|i| Some(offset + (i as f64 / 90.0).sin() * 10.0))
            .collect()
    };
    TimeSeriesFrame::new(
        timestamps,
        vec![
            Column::float("CH_1_KW", wave(300.0)),
            Column::float("CH_0_RT", wave(500.0)),
            Column::float("AHWP_3_KWH", (0..rows).map(|i| Some(i as f64)).collect()),
            Column::float("CHWP_1_S", (0..rows).map(|i| Some((i % 2) as f64)).collect()),
            Column::float("temp_db_out", wave(30.0)),
        ],
    )
    .unwrap()
}

fn report_header(points: usize) -> Vec<String> {
    let mut lines = vec!["\"PLANT_ROOM_TREND_REPORT\"".to_string()];
    for i in 1..=points {
        lines.push(format!("\"Point_{}:\",\"AH-B{}-1.CV\",\"\",\"1 minute\"", i, i));
    }
    lines.push("\"<>Date\",\"Time\",\"Point_1\"".to_string());
    lines
}

fn bench_resample(c: &mut Criterion) {
    let frame = week_of_minutes();
    let resampler = Resampler::parse("5m").unwrap();
    c.bench_function("resample_week_5m", |b| {
        b.iter(|| resampler.resample(black_box(&frame)).unwrap())
    });
}

fn bench_frozen(c: &mut Criterion) {
    let frame = week_of_minutes();
    let detector = FrozenDetector::new(6);
    let columns = vec!["CH_1_KW".to_string(), "temp_db_out".to_string()];
    c.bench_function("frozen_week", |b| {
        b.iter(|| detector.detect_all(black_box(&frame), &columns).unwrap())
    });
}

fn bench_header_scan(c: &mut Criterion) {
    let lines = report_header(200);
    let scanner = HeaderScanner::new(211).unwrap();
    c.bench_function("header_scan_200_points", |b| {
        b.iter(|| scanner.scan(black_box(&lines)))
    });
}

criterion_group!(benches, bench_resample, bench_frozen, bench_header_scan);
criterion_main!(benches);
