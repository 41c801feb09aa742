use rust_decimal::Decimal;
use uuid::Uuid;

// ============================================================================
// Account Domain Commands
// ============================================================================
//
// Raw caller input. Currencies and status names are parsed by the handler so
// that malformed input surfaces as a validation error.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum AccountCommand {
    CreateAccount {
        customer_id: Uuid,
        initial_balance: Decimal,
        currency: String,
    },
    UpdateAccountStatus {
        account_id: Uuid,
        new_status: String,
    },
    Deposit {
        account_id: Uuid,
        amount: Decimal,
        currency: String,
    },
    Withdraw {
        account_id: Uuid,
        amount: Decimal,
        currency: String,
    },
}

impl AccountCommand {
    pub fn name(&self) -> &'static str {
        match self {
            AccountCommand::CreateAccount { .. } => "CreateAccount",
            AccountCommand::UpdateAccountStatus { .. } => "UpdateAccountStatus",
            AccountCommand::Deposit { .. } => "Deposit",
            AccountCommand::Withdraw { .. } => "Withdraw",
        }
    }
}
