//! A summary of a partitioning run, in a form that can be printed for people
//! or written out for other tools.

use std::{fs::File, io::Write};

use itertools::Itertools;
use ltp_errors::driver::{Error, Result};
use ltp_partition::{partition::Partition, PartitionOutput};
use ltp_symtab::SymbolGraph;
use serde::Serialize;

/// The outcome of a partitioning run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PartitionReport {
    /// Every partition, in the order it was created.
    pub partitions: Vec<PartitionSummary>,

    /// The names of the symbols that were promoted to hidden globals.
    pub promoted: Vec<String>,

    /// The symbols that had to be renamed to be promoted.
    pub renamed: Vec<RenamedSymbol>,

    /// The names of the symbols that ended up in more than one partition.
    pub multiply_placed: Vec<String>,
}

/// A single partition of the program.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PartitionSummary {
    pub name:     String,
    pub insns:    u64,
    pub boundary: Option<u64>,
    pub internal: Option<u64>,
    pub members:  Vec<String>,
}

/// A symbol that was renamed during promotion.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RenamedSymbol {
    pub from: String,
    pub to:   String,
}

impl PartitionReport {
    /// Summarises the `output` of the partitioner.
    ///
    /// Symbols are named as they are after promotion.
    #[must_use]
    pub fn new(output: &PartitionOutput) -> Self {
        let graph = &output.graph;
        let name_of = |id| graph.symbol(id).name.clone();

        let partitions = output
            .partitioning
            .partitions()
            .iter()
            .map(|p| PartitionSummary::new(graph, p))
            .collect();
        let (promoted, renamed) = match &output.promotions {
            Some(report) => (
                report.promoted.iter().copied().map(name_of).collect(),
                report
                    .renamed
                    .iter()
                    .map(|r| RenamedSymbol {
                        from: r.from.clone(),
                        to:   r.to.clone(),
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let multiply_placed =
            output.partitioning.multiply_placed().into_iter().map(name_of).collect();

        Self {
            partitions,
            promoted,
            renamed,
            multiply_placed,
        }
    }

    /// Renders the report as a table with one row per partition, followed by
    /// the promoted and renamed symbols.
    #[must_use]
    pub fn to_table(&self) -> String {
        let width = self
            .partitions
            .iter()
            .map(|p| p.display_name().len())
            .chain(std::iter::once("partition".len()))
            .max()
            .unwrap_or_default();
        let cost = |c: Option<u64>| c.map_or_else(|| "-".to_string(), |c| c.to_string());

        let header = format!(
            "{:<width$}  {:>8}  {:>8}  {:>8}  {:>7}",
            "partition", "insns", "boundary", "internal", "symbols"
        );
        let rows = self.partitions.iter().map(|p| {
            format!(
                "{:<width$}  {:>8}  {:>8}  {:>8}  {:>7}",
                p.display_name(),
                p.insns,
                cost(p.boundary),
                cost(p.internal),
                p.members.len()
            )
        });
        let mut table = std::iter::once(header).chain(rows).join("\n");

        if !self.promoted.is_empty() {
            table.push_str(&format!("\n\npromoted: {}", self.promoted.iter().join(", ")));
        }
        if !self.renamed.is_empty() {
            let renames = self.renamed.iter().map(|r| format!("{} -> {}", r.from, r.to)).join(", ");
            table.push_str(&format!("\nrenamed: {renames}"));
        }
        if !self.multiply_placed.is_empty() {
            let names = self.multiply_placed.iter().join(", ");
            table.push_str(&format!("\nin multiple partitions: {names}"));
        }

        table
    }

    /// Encodes the report as an S-expression.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if the report cannot be encoded.
    pub fn to_str(&self) -> Result<String> {
        serde_sexpr::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Writes the report, encoded as an S-expression, to the provided
    /// `writer`.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if the report cannot be encoded.
    /// - [`Error::IOError`] if the report cannot be written.
    pub fn write(&self, mut writer: impl Write) -> Result<()> {
        let encoded = self.to_str()?;
        writer.write_all(encoded.as_bytes())?;
        Ok(())
    }

    /// Writes the report, encoded as an S-expression, to the file at the
    /// provided `filename`.
    ///
    /// # Errors
    ///
    /// - [`Error::IOError`] if the file cannot be created.
    /// - [`Error::Serialization`] if the report cannot be encoded.
    pub fn write_to_file(&self, filename: &str) -> Result<()> {
        let writer = File::create(filename)?;
        self.write(writer)
    }
}

impl PartitionSummary {
    /// Summarises `partition`, naming its members as they are in `graph`.
    #[must_use]
    pub fn new(graph: &SymbolGraph, partition: &Partition) -> Self {
        let cost = partition.cost();
        Self {
            name:     partition.name().to_string(),
            insns:    partition.insns(),
            boundary: cost.map(|c| c.boundary),
            internal: cost.map(|c| c.internal),
            members:  partition
                .symbols()
                .as_slice()
                .iter()
                .map(|id| graph.symbol(*id).name.clone())
                .collect(),
        }
    }

    /// Gets the name to show for the partition, as balanced partitions have
    /// none.
    fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<unnamed>"
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod test {
    use ltp_partition::config::{PartitionConfigBuilder, PartitionPolicy};
    use ltp_symtab::{RefUse, SymbolGraphBuilder};

    use crate::{partition, report::PartitionReport};

    fn clashing_program() -> anyhow::Result<PartitionReport> {
        let mut builder = SymbolGraphBuilder::new();
        let user_a = builder.function("user_a", 10);
        let counter_a = builder.variable("counter", 4);
        let user_b = builder.function("user_b", 12);
        let counter_b = builder.variable("counter", 4);
        builder.file(user_a, "a.c").file(counter_a, "a.c");
        builder.file(user_b, "b.c").file(counter_b, "b.c");
        builder.reference(user_a, counter_b, RefUse::Load);
        builder.reference(user_b, counter_a, RefUse::Load);

        let config = PartitionConfigBuilder::new()
            .with_policy(PartitionPolicy::OneToOne)
            .build()?;
        let output = partition(builder.build()?, config)?;
        Ok(PartitionReport::new(&output))
    }

    #[test]
    fn report_names_symbols_after_promotion() -> anyhow::Result<()> {
        let report = clashing_program()?;

        assert_eq!(report.partitions.len(), 2);
        assert_eq!(report.partitions[0].name, "a.c");
        assert_eq!(report.partitions[0].insns, 10);
        assert_eq!(
            report.partitions[1].members,
            vec!["user_b".to_string(), "counter".to_string()]
        );
        assert_eq!(
            report.partitions[0].members,
            vec!["user_a".to_string(), "counter.lto_priv.0".to_string()]
        );
        assert_eq!(report.promoted, vec!["counter", "counter.lto_priv.0"]);
        assert_eq!(report.renamed.len(), 1);
        assert!(report.multiply_placed.is_empty());

        Ok(())
    }

    #[test]
    fn table_has_a_row_per_partition() -> anyhow::Result<()> {
        let table = clashing_program()?.to_table();
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("partition"));
        assert!(lines[1].starts_with("a.c"));
        assert!(lines[1].trim_end().ends_with('2'));
        assert!(lines[2].starts_with("b.c"));
        assert!(table.contains("promoted: counter, counter.lto_priv.0"));
        assert!(table.contains("renamed: counter -> counter.lto_priv.0"));

        Ok(())
    }

    #[test]
    fn balanced_partitions_carry_their_costs() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("a", 10);
        let b = builder.function("b", 10);
        builder.call(a, b);
        let output = partition(builder.build()?, PartitionConfigBuilder::new().build()?)?;
        let report = PartitionReport::new(&output);

        assert_eq!(report.partitions[0].boundary, Some(0));
        assert_eq!(report.partitions[0].internal, Some(1));
        assert!(report.to_table().contains("<unnamed>"));
        assert!(!report.to_str()?.is_empty());

        Ok(())
    }
}
