use tabled::Tabled;

use ledgerlink_core::Services;
use ledgerlink_core::model::Loan;

use crate::cli::{LoansArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct LoanRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Type")]
    loan_type: String,
    #[tabled(rename = "Tenure")]
    tenure: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created: String,
}

fn row(loan: &Loan, color: bool) -> LoanRow {
    LoanRow {
        id: loan.id,
        amount: format!("{:.2}", loan.amount),
        loan_type: loan.loan_type.clone().unwrap_or_default(),
        tenure: loan
            .tenure_months
            .map(|m| format!("{m} mo"))
            .unwrap_or_default(),
        status: output::loan_status(&loan.status, color),
        created: loan.created_at.clone().unwrap_or_default(),
    }
}

pub async fn handle(args: LoansArgs, services: &Services, format: OutputFormat) -> Result<(), CliError> {
    let loans = services.api.my_loans(&args.account).await?;
    let color = output::should_color();
    let rendered = output::render_list(format, &loans, |loan| row(loan, color))?;
    output::print_output(&rendered);
    Ok(())
}
