use std::fs;
use std::ops::ControlFlow;
use ffdb::TimeWindow;
use ffdb::storage::{DirStructure, PartitionWalker};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const DAY: f64 = 86400.0;
const HOUR: f64 = 3600.0;
const JAN_05: f64 = 1073260800.0;

fn visited(structure: &DirStructure, duration: f64, root: &std::path::Path, window: TimeWindow) -> Vec<f64> {
    let walker = PartitionWalker::new(structure, duration, window);
    let mut starts = Vec::new();
    let flow = walker
        .walk(root, &|| false, &mut |_dir, start| {
            starts.push(start);
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
    assert!(flow.is_continue());
    starts
}

fn check_random_trees(pattern: Option<&str>, duration: f64, seed: u64) {
    let structure = DirStructure::from_pattern(pattern).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..20 {
        let root = TempDir::new().unwrap();
        let mut starts: Vec<f64> = (0..40)
            .filter(|_| rng.gen_bool(0.4))
            .map(|i| JAN_05 + i as f64 * duration)
            .collect();
        for &start in &starts {
            fs::create_dir_all(root.path().join(structure.format(start).unwrap())).unwrap();
        }
        starts.sort_by(f64::total_cmp);

        for _ in 0..25 {
            let a = JAN_05 + rng.gen_range(-5.0..45.0) * duration;
            let b = a + rng.gen_range(0.0..10.0) * duration;
            // land exactly on partition edges now and then
            let (tmin, tmax) = if rng.gen_bool(0.3) { (a.round(), (a + duration).round()) } else { (a, b) };
            let window = TimeWindow::new(tmin, tmax);

            let expected: Vec<f64> = starts
                .iter()
                .copied()
                .filter(|&s| s + duration >= tmin && s <= tmax)
                .collect();
            assert_eq!(visited(&structure, duration, root.path(), window), expected, "window {:?}", window);
        }
        assert_eq!(visited(&structure, duration, root.path(), TimeWindow::unbounded()), starts);
    }
}

#[test]
fn daily_partitions_prune_like_brute_force() {
    check_random_trees(Some("%Y/%m/%d"), DAY, 7);
}

#[test]
fn hourly_partitions_prune_like_brute_force() {
    check_random_trees(Some("%Y/%j/%H"), HOUR, 11);
}

#[test]
fn day_suffix_partitions_prune_like_brute_force() {
    check_random_trees(None, DAY, 13);
}

#[test]
fn stray_directories_are_ignored() {
    let structure = DirStructure::from_pattern(Some("%Y/%m/%d")).unwrap();
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("2004/01/05")).unwrap();
    fs::create_dir_all(root.path().join("2004/01/.hidden")).unwrap();
    fs::create_dir_all(root.path().join("2004/notes/xx")).unwrap();
    fs::write(root.path().join("2004/01/06"), "a file, not a partition").unwrap();

    assert_eq!(visited(&structure, DAY, root.path(), TimeWindow::unbounded()), vec![JAN_05]);
}

#[test]
fn stop_flag_ends_the_walk() {
    let structure = DirStructure::from_pattern(Some("%Y/%m/%d")).unwrap();
    let root = TempDir::new().unwrap();
    for day in 0..5 {
        fs::create_dir_all(root.path().join(structure.format(JAN_05 + day as f64 * DAY).unwrap())).unwrap();
    }
    let walker = PartitionWalker::new(&structure, DAY, TimeWindow::unbounded());
    let mut seen = 0;
    let flow = walker
        .walk(root.path(), &|| false, &mut |_dir, _start| {
            seen += 1;
            Ok(if seen == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
        })
        .unwrap();
    assert!(flow.is_break());
    assert_eq!(seen, 2);

    let flow = walker.walk(root.path(), &|| true, &mut |_dir, _start| panic!("visited")).unwrap();
    assert!(flow.is_break());
}
