//! Concurrent read load across replicas.

use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_concurrent_reads_spread_across_replicas() {
    let t = common::start_cluster(3, common::fast_settings()).await;
    let concurrency = 16;
    let reads_per_task = 50;
    let total = concurrency * reads_per_task;

    let start = Instant::now();
    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let cluster = t.cluster.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..reads_per_task {
                let read_start = Instant::now();
                if cluster.read("select * from events", &[]).await.is_ok() {
                    latencies.push(read_start.elapsed());
                }
            }
            latencies
        }));
    }

    let mut all_latencies: Vec<Duration> = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }
    let duration = start.elapsed();

    assert_eq!(all_latencies.len(), total, "Every read should succeed");
    assert_eq!(t.primary.reads(), 0);
    let per_replica: Vec<_> = t.replicas.iter().map(|r| r.reads()).collect();
    assert_eq!(per_replica.iter().sum::<usize>(), total);
    assert!(per_replica.iter().all(|&n| n > 0), "uneven spread: {:?}", per_replica);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Read Load Results ---");
    println!("Total Reads:    {}", total);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("Per Replica:    {:?}", per_replica);
    println!("-------------------------\n");

    t.cluster.shutdown().await;
}

#[tokio::test]
async fn test_reads_survive_replica_churn() {
    let t = common::start_cluster(2, common::fast_settings()).await;

    let reader = {
        let cluster = t.cluster.clone();
        tokio::spawn(async move {
            let mut failures = 0;
            for _ in 0..200 {
                if cluster.read("select 1 from t", &[]).await.is_err() {
                    failures += 1;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            failures
        })
    };

    for _ in 0..3 {
        t.replicas[0].set_healthy(false);
        tokio::time::sleep(Duration::from_millis(60)).await;
        t.replicas[0].set_healthy(true);
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    // A replica can fail between a probe and the next recompute, so a few
    // reads may reach the driver and error. The primary and the other
    // replica stay up, so routing itself never fails.
    let failures = reader.await.unwrap();
    assert!(failures < 200);
    assert!(t.cluster.health().primary_ok);

    t.cluster.shutdown().await;
}
