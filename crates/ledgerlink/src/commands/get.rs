use ledgerlink_core::{RequestOptions, Services};

use crate::cli::{GetArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: GetArgs, services: &Services, format: OutputFormat) -> Result<(), CliError> {
    let path = if args.path.starts_with('/') {
        args.path
    } else {
        format!("/{}", args.path)
    };

    let opts = args
        .query
        .into_iter()
        .fold(RequestOptions::cached(), |opts, (k, v)| opts.query(k, v));
    let body = services.api.request_value(&path, opts).await?;

    output::print_output(&output::render_json(format, body.as_ref())?);
    Ok(())
}
