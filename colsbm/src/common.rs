use colsbm::collection::NodeGroup;
use colsbm::{Emission, Network};
use matrix_util::common_io::{basename, mkdir, write_lines};
use matrix_util::traits::IoOps;
use nalgebra::DMatrix;
use std::sync::Arc;

/// `Q` or `Q1,Q2`. A single value is used on both axes.
pub fn parse_coord(s: &str) -> Result<(usize, usize), String> {
    let parse = |x: &str| {
        x.trim()
            .parse::<usize>()
            .map_err(|e| format!("`{}`: {}", x, e))
    };
    match s.split_once(',') {
        Some((a, b)) => Ok((parse(a)?, parse(b)?)),
        None => {
            let q = parse(s)?;
            Ok((q, q))
        }
    }
}

/// Comma-separated list of floats
pub fn parse_floats(s: &str) -> anyhow::Result<Vec<f64>> {
    s.split(',')
        .map(|x| {
            x.trim()
                .parse::<f64>()
                .map_err(|e| anyhow::anyhow!("`{}`: {}", x, e))
        })
        .collect()
}

/// Read one network per file; the file stem becomes the network id.
/// `NA`, `NaN` and empty fields are missing dyads.
pub fn read_networks(
    files: &[Box<str>],
    bipartite: bool,
    emission: Emission,
) -> anyhow::Result<Vec<Arc<Network>>> {
    let mut networks = Vec::with_capacity(files.len());
    for file in files.iter() {
        let mat = DMatrix::<f64>::from_tsv(file, None)?;
        let id = basename(file)?;
        log::info!(
            "read {}: {} x {} {}",
            file,
            mat.nrows(),
            mat.ncols(),
            if bipartite { "incidence" } else { "adjacency" }
        );
        let net = if bipartite {
            Network::bipartite(id, mat, emission)?
        } else {
            Network::unipartite(id, mat, emission)?
        };
        networks.push(Arc::new(net));
    }
    Ok(networks)
}

/// Node table: group, network, axis, node, block, probability
pub fn write_node_groups(groups: &[NodeGroup], file: &str) -> anyhow::Result<()> {
    mkdir(file)?;
    let mut lines = Vec::with_capacity(groups.len() + 1);
    lines.push("group\tnetwork\taxis\tnode\tblock\tprobability".to_string());
    lines.extend(groups.iter().map(|g| {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{:.6}",
            g.group, g.network, g.axis, g.node, g.block, g.probability
        )
    }));
    write_lines(&lines, file)?;
    log::info!("wrote {}", file);
    Ok(())
}

pub fn write_json(value: &serde_json::Value, file: &str) -> anyhow::Result<()> {
    mkdir(file)?;
    std::fs::write(file, serde_json::to_string_pretty(value)?)?;
    log::info!("wrote {}", file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coord() {
        assert_eq!(parse_coord("3"), Ok((3, 3)));
        assert_eq!(parse_coord("2, 5"), Ok((2, 5)));
        assert!(parse_coord("a,1").is_err());
    }

    #[test]
    fn test_parse_floats() {
        assert_eq!(parse_floats("1, 0.5").unwrap(), vec![1.0, 0.5]);
        assert!(parse_floats("1,x").is_err());
    }
}
