//! DBSCAN over a small 2-D dataset, run in the background with a progress stream.
//!
//! Pass a file of whitespace-separated integer points to cluster it instead:
//!
//! ```text
//! cargo run --example clustering -- points.txt 5000 4 quadtree
//! ```

use dbscan_index::{DbscanParams, IndexKind, PointSet, RunStatus, Session, Stage, Strategy, NOISE};

fn main() -> dbscan_index::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let points = match args.first() {
        Some(path) => dbscan_index::load_points_file(path)?,
        None => PointSet::from_coords(vec![
            // Cluster A (near origin)
            vec![0, 0],
            vec![1, 2],
            vec![2, 1],
            vec![-1, 1],
            // Cluster B (near (50, 50))
            vec![50, 50],
            vec![51, 49],
            vec![49, 51],
            vec![52, 52],
            // Cluster C (near (100, 0))
            vec![100, 0],
            vec![101, 1],
            vec![99, -1],
            vec![102, 2],
            // Outlier
            vec![300, 300],
        ])?,
    };
    let epsilon: i64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(3);
    let min_pts: i64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(2);
    let strategy: Strategy = match args.get(3) {
        Some(s) => s.parse()?,
        None => Strategy::KdTree,
    };

    let session = Session::new(points, DbscanParams::new(epsilon, min_pts)?);
    for kind in [IndexKind::QuadTreeArbitrary, IndexKind::QuadTreeBalanced, IndexKind::QuadTreeZOrder] {
        if let Ok(shape) = session.index_shape(kind) {
            println!("{kind:?}: max depth {}, avg depth {:.3}", shape.max_depth, shape.avg_depth);
        }
    }

    let handle = session.spawn_pipeline(strategy)?;
    let mut last = None;
    for p in handle.progress().iter() {
        let pct = p.percent();
        if last != Some((p.stage, pct)) {
            let stage = match p.stage {
                Stage::Neighbors => "neighbors",
                Stage::Clustering => "clustering",
            };
            println!("{stage:>10}: {pct:3}%");
            last = Some((p.stage, pct));
        }
    }

    let RunStatus::Completed(partition) = handle.join()? else {
        println!("cancelled");
        return Ok(());
    };

    println!(
        "\n=== DBSCAN (eps={epsilon}, min_pts={min_pts}, {strategy}) ===\n{} clusters, {} noise",
        partition.n_clusters(),
        partition.noise().len()
    );
    let points = session.points();
    for (i, label) in partition.labels(points.len()).into_iter().enumerate().take(40) {
        let label = label.unwrap_or(NOISE);
        let tag = if label == NOISE {
            "NOISE".to_string()
        } else {
            format!("cluster {}", label)
        };
        println!("  point {:2} {:?} => {}", i, points.coords(dbscan_index::PointId(i)), tag);
    }
    Ok(())
}
