use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    classify::EarnerClassifier,
    cli::IngestArgs,
    config::EarnerConfig,
    io_utils,
    mapping::MappingConfig,
    normalize::Normalizer,
    printable_delimiter,
    schema::Schema,
    source,
    store::MergeStore,
    table,
};

pub fn execute(args: &IngestArgs) -> Result<()> {
    let schema = Schema::load(&args.schema)
        .with_context(|| format!("Loading schema config {:?}", args.schema))?;
    let mapping = MappingConfig::load(&args.mapping)
        .with_context(|| format!("Loading mapping config {:?}", args.mapping))?;
    let earners = EarnerConfig::load_optional(&args.earners)
        .with_context(|| format!("Loading earner config {:?}", args.earners))?;
    let classifier = EarnerClassifier::from_config(&earners);

    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Ingesting '{}' with delimiter '{}' and encoding {}",
        args.input.display(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    let mut raw = source::read_record_set(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading source {:?}", args.input))?;
    if !args.no_source_tag {
        let label = source::source_label(&args.input);
        if source::tag_source(&mut raw, &args.source_column, &label)? {
            info!("Tagged rows with {}='{label}'", args.source_column);
        }
    }

    let batch = Normalizer::new(&schema, &classifier)
        .normalize(raw, &mapping)
        .with_context(|| format!("Normalizing {:?}", args.input))?;
    if !batch.warnings.is_empty() {
        let columns = batch
            .warnings
            .iter()
            .map(|w| w.column.as_str())
            .collect::<Vec<_>>();
        warn!("Column(s) left unconverted: {}", columns.join(", "));
    }

    if let Some(limit) = args.preview {
        let rows = batch
            .records
            .rendered_rows()
            .into_iter()
            .take(limit)
            .collect::<Vec<_>>();
        table::print_table(batch.records.headers(), &rows);
    }

    if args.dry_run {
        info!(
            "Dry run: {} normalized row(s) not written to {:?}",
            batch.records.len(),
            args.store
        );
        return Ok(());
    }

    let store = MergeStore::open(&args.store)
        .with_context(|| format!("Opening store {:?}", args.store))?;
    let outcome = store
        .merge_and_persist(&batch.records, &batch.key_columns)
        .with_context(|| format!("Merging into store {:?}", args.store))?;
    info!(
        "Merged {} incoming row(s) into {} existing: {} inserted, {} updated, {} total (sha256 {})",
        outcome.incoming_rows,
        outcome.existing_rows,
        outcome.inserted,
        outcome.updated,
        outcome.total_rows,
        outcome.digest
    );
    Ok(())
}
