use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plan::Plan;
use crate::table::TableSpec;

/// Size figures for one compiled table, one CSV row per table and run.
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub timestamp: DateTime<Utc>,
    pub table_id: String,
    pub route: String,
    pub sections: usize,
    pub departures: usize,
    pub encoded_bytes: usize,
}

impl TableStats {
    /// Collects stats for every table of `plan`, in plan order.
    ///
    /// `encoded_bytes` includes the lone terminators of sections a table
    /// does not define, since those are part of the generated data too.
    pub fn from_plan(tables: &[TableSpec], plan: &Plan) -> Vec<Self> {
        let timestamp = Utc::now();

        plan.tables
            .iter()
            .zip(&plan.data)
            .map(|(meta, row)| {
                let spec = tables.iter().find(|table| table.id == meta.id);
                TableStats {
                    timestamp,
                    table_id: meta.id.clone(),
                    route: meta.route.to_string(),
                    sections: spec.map_or(0, |table| table.sections.len()),
                    departures: spec.map_or(0, TableSpec::departure_count),
                    encoded_bytes: row.iter().map(Vec::len).sum(),
                }
            })
            .collect()
    }

    /// Average encoded bytes per departure.
    pub fn bytes_per_departure(&self) -> f64 {
        if self.departures == 0 {
            0.0
        } else {
            self.encoded_bytes as f64 / self.departures as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::assemble;
    use crate::timetable::parse_timetable;

    #[test]
    fn test_from_plan_counts_per_table() {
        let tables = vec![
            TableSpec::from_stem("a_2_b", parse_timetable("# W\n5 0 10 20 30 40 50\n").unwrap())
                .unwrap(),
            TableSpec::from_stem("b_1_a", parse_timetable("# S\n6 15\n").unwrap()).unwrap(),
        ];
        let plan = assemble(&tables).unwrap();
        let stats = TableStats::from_plan(&tables, &plan);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].table_id, "b1a");
        assert_eq!(stats[0].departures, 1);
        // [0x80, 7, 0] for S plus the lone terminator for W.
        assert_eq!(stats[0].encoded_bytes, 4);

        assert_eq!(stats[1].table_id, "a2b");
        assert_eq!(stats[1].route, "2");
        assert_eq!(stats[1].sections, 1);
        assert_eq!(stats[1].departures, 6);
        // [60, 0x85, 10, 0] for W plus the lone terminator for S.
        assert_eq!(stats[1].encoded_bytes, 5);
    }

    #[test]
    fn test_bytes_per_departure_with_zero_departures() {
        let stats = TableStats {
            timestamp: Utc::now(),
            table_id: "a1b".into(),
            route: "1".into(),
            sections: 0,
            departures: 0,
            encoded_bytes: 1,
        };
        assert_eq!(stats.bytes_per_departure(), 0.0);
    }
}
