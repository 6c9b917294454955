//! Stage/flow alignment.
//!
//! Stage and flow are collected independently and rarely share every
//! timestamp, so they are joined with a full outer join: each timestamp that
//! appears in either series yields exactly one `CombinedRecord`, with the
//! missing side left as `None`.

use std::cmp::Ordering;

use crate::model::{CombinedRecord, Series};

/// Outer-joins `stage` and `flow` on timestamp, ascending.
///
/// Both inputs are already sorted and unique per timestamp, so this is a
/// single merge pass.
pub fn combine(stage: &Series, flow: &Series) -> Vec<CombinedRecord> {
    let stage = stage.readings();
    let flow = flow.readings();
    let mut out = Vec::with_capacity(stage.len().max(flow.len()));
    let (mut i, mut j) = (0, 0);

    while i < stage.len() || j < flow.len() {
        let next = match (stage.get(i), flow.get(j)) {
            (Some(s), Some(f)) => match s.timestamp.cmp(&f.timestamp) {
                Ordering::Less => {
                    i += 1;
                    CombinedRecord {
                        timestamp: s.timestamp,
                        stage_value: Some(s.value),
                        flow_value: None,
                    }
                }
                Ordering::Greater => {
                    j += 1;
                    CombinedRecord {
                        timestamp: f.timestamp,
                        stage_value: None,
                        flow_value: Some(f.value),
                    }
                }
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                    CombinedRecord {
                        timestamp: s.timestamp,
                        stage_value: Some(s.value),
                        flow_value: Some(f.value),
                    }
                }
            },
            (Some(s), None) => {
                i += 1;
                CombinedRecord {
                    timestamp: s.timestamp,
                    stage_value: Some(s.value),
                    flow_value: None,
                }
            }
            (None, Some(f)) => {
                j += 1;
                CombinedRecord {
                    timestamp: f.timestamp,
                    stage_value: None,
                    flow_value: Some(f.value),
                }
            }
            (None, None) => break,
        };
        out.push(next);
    }

    out
}
