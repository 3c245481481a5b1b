use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::config::READ_BUFFER_SIZE;
use crate::error::{Result, SccError};
use crate::graph::GraphBuilder;

/// Terminator of a vertex record in the packed binary format.
pub const RECORD_END: i32 = i32::MIN;

fn loading_bar(len: u64, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"));
    pb.set_message(message);
    pb
}

fn open<P: AsRef<Path>>(path: P) -> Result<(BufReader<File>, u64)> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok((BufReader::with_capacity(READ_BUFFER_SIZE, file), len))
}

/// Reads a text edge list into `builder`.
///
/// Every line holds one arc `"<from> <to>"`, separated by whitespace. Blank
/// lines and lines starting with `#` are skipped. Both endpoints are created
/// if they do not exist yet.
///
/// # Returns
/// * The number of arcs read
pub fn read_edge_list<R: BufRead>(reader: R, builder: &mut GraphBuilder, pb: Option<&ProgressBar>) -> Result<usize> {
    let mut arcs = 0;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(pb) = pb {
            pb.inc(line.len() as u64 + 1);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let parsed = match (tokens.next(), tokens.next()) {
            (Some(from), Some(to)) => from.parse::<u64>().ok().zip(to.parse::<u64>().ok()),
            _ => None,
        };
        let (from, to) = parsed.ok_or_else(|| SccError::Parse {
            line: line_no + 1,
            content: line.clone(),
        })?;
        builder.add_arc(from, to);
        arcs += 1;
    }
    Ok(arcs)
}

/// Reads initial vertex ids, one per line, and registers them on `builder`.
///
/// # Errors
/// * `SccError::UnknownVertex` for an id that is not part of the graph
pub fn read_inits<R: BufRead>(reader: R, builder: &mut GraphBuilder) -> Result<usize> {
    let mut count = 0;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let id = trimmed.parse::<u64>().map_err(|_| SccError::Parse {
            line: line_no + 1,
            content: line.clone(),
        })?;
        builder.add_init(id)?;
        count += 1;
    }
    Ok(count)
}

/// Reads the packed binary record stream into `builder`.
///
/// The stream is a sequence of big-endian `i32` values. Each record is a
/// vertex id followed by the ids of its successors and closed by
/// [`RECORD_END`]. Successors are created if needed. Negative ids and a
/// stream ending inside a record are rejected; errors report the index of the
/// offending `i32` value.
pub fn read_binary_records<R: Read>(mut reader: R, builder: &mut GraphBuilder) -> Result<usize> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(SccError::Parse {
            line: bytes.len() / 4,
            content: format!("{} trailing bytes", bytes.len() % 4),
        });
    }

    let values: Vec<i32> = bytes
        .chunks_exact(4)
        .map(|chunk| i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    let to_id = |pos: usize, value: i32| -> Result<u64> {
        u64::try_from(value).map_err(|_| SccError::Parse {
            line: pos,
            content: format!("negative vertex id {}", value),
        })
    };

    let mut arcs = 0;
    let mut pos = 0;
    while pos < values.len() {
        let node = to_id(pos, values[pos])?;
        builder.add_node(node);
        pos += 1;
        loop {
            match values.get(pos) {
                None => {
                    return Err(SccError::Parse {
                        line: pos,
                        content: format!("record of vertex {} is not terminated", node),
                    })
                }
                Some(&RECORD_END) => {
                    pos += 1;
                    break;
                }
                Some(&target) => {
                    builder.add_arc(node, to_id(pos, target)?);
                    arcs += 1;
                    pos += 1;
                }
            }
        }
    }
    Ok(arcs)
}

/// Loads a text edge list file, showing a progress bar over its bytes.
pub fn load_text_graph<P: AsRef<Path>>(path: P) -> Result<GraphBuilder> {
    let (reader, len) = open(&path)?;
    let pb = loading_bar(len, "Graph Loading.");
    let mut builder = GraphBuilder::new();
    let arcs = read_edge_list(reader, &mut builder, Some(&pb))?;
    pb.finish_and_clear();
    info!("Loaded {}: {} vertices, {} arcs", path.as_ref().display(), builder.vertex_count(), arcs);
    Ok(builder)
}

/// Loads a packed binary record file.
pub fn load_binary_graph<P: AsRef<Path>>(path: P) -> Result<GraphBuilder> {
    let (reader, len) = open(&path)?;
    let pb = loading_bar(len, "Graph Loading.");
    let mut builder = GraphBuilder::new();
    let arcs = read_binary_records(pb.wrap_read(reader), &mut builder)?;
    pb.finish_and_clear();
    info!("Loaded {}: {} vertices, {} arcs", path.as_ref().display(), builder.vertex_count(), arcs);
    Ok(builder)
}

/// Registers the initial vertices listed in `path` on `builder`.
pub fn load_inits<P: AsRef<Path>>(path: P, builder: &mut GraphBuilder) -> Result<usize> {
    let (reader, _) = open(&path)?;
    let count = read_inits(reader, builder)?;
    info!("Loaded {} initial vertices from {}", count, path.as_ref().display());
    Ok(count)
}
