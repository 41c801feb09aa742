use super::errors::AccountError;
use super::value_objects::AccountStatus;

// ============================================================================
// Account Status Transition Table
// ============================================================================
//
// Total table over (current status x requested status). Every cell is one of:
//
// - Allowed     the transition may proceed
// - Denied      rejected with a reason, the aggregate is never touched
// - Unreviewed  no business rule exists for it yet; allowed unless the table
//               is strict, and logged every time it is used
//
// The aggregate still rejects same-status requests on its own, so diagonal
// cells that are Allowed end in `AccountError::NoOpTransition`.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRule {
    Allowed,
    Denied(&'static str),
    Unreviewed,
}

const STATUS_COUNT: usize = AccountStatus::ALL.len();

#[derive(Debug, Clone)]
pub struct TransitionTable {
    cells: [[TransitionRule; STATUS_COUNT]; STATUS_COUNT],
}

impl TransitionTable {
    /// Rules currently agreed with the business:
    /// closing, marking dormant and reactivating are guarded, CLOSED is terminal.
    pub fn standard() -> Self {
        use AccountStatus::*;

        let mut cells = [[TransitionRule::Allowed; STATUS_COUNT]; STATUS_COUNT];

        for from in AccountStatus::ALL {
            for to in AccountStatus::ALL {
                let rule = match (from, to) {
                    (Closed, Closed) => TransitionRule::Denied("account is already closed"),
                    (Closed, Active) => TransitionRule::Denied("closed accounts cannot be reactivated"),
                    (Closed, Dormant) => TransitionRule::Denied("closed accounts cannot be marked dormant"),
                    (Closed, _) => TransitionRule::Denied("closed accounts are terminal"),

                    (Pending | Suspended, Closed) => {
                        TransitionRule::Denied("account cannot be closed in its current state")
                    }
                    (_, Closed) => TransitionRule::Allowed,

                    (Dormant, Dormant) => TransitionRule::Denied("account is already dormant"),
                    (_, Dormant) => TransitionRule::Allowed,

                    (Active, Active) => TransitionRule::Denied("account is already active"),
                    (_, Active) => TransitionRule::Allowed,

                    (from, to) if from == to => TransitionRule::Allowed,
                    (_, Inactive | Suspended | Pending | Frozen) => TransitionRule::Unreviewed,
                };
                cells[from.index()][to.index()] = rule;
            }
        }

        Self { cells }
    }

    /// Deny every unreviewed cell.
    pub fn strict(mut self) -> Self {
        for row in self.cells.iter_mut() {
            for cell in row.iter_mut() {
                if *cell == TransitionRule::Unreviewed {
                    *cell = TransitionRule::Denied("transition has not been reviewed");
                }
            }
        }
        self
    }

    pub fn with_rule(mut self, from: AccountStatus, to: AccountStatus, rule: TransitionRule) -> Self {
        self.cells[from.index()][to.index()] = rule;
        self
    }

    pub fn rule(&self, from: AccountStatus, to: AccountStatus) -> TransitionRule {
        self.cells[from.index()][to.index()]
    }

    pub fn check(&self, from: AccountStatus, to: AccountStatus) -> Result<(), AccountError> {
        match self.rule(from, to) {
            TransitionRule::Allowed => Ok(()),
            TransitionRule::Denied(reason) => Err(AccountError::IllegalTransition { from, to, reason }),
            TransitionRule::Unreviewed => {
                tracing::warn!(
                    from = %from,
                    to = %to,
                    "Applying unreviewed account status transition"
                );
                Ok(())
            }
        }
    }

    /// Cells still waiting for a business decision.
    pub fn unreviewed(&self) -> Vec<(AccountStatus, AccountStatus)> {
        let mut pending = Vec::new();
        for from in AccountStatus::ALL {
            for to in AccountStatus::ALL {
                if self.rule(from, to) == TransitionRule::Unreviewed {
                    pending.push((from, to));
                }
            }
        }
        pending
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use AccountStatus::*;

    #[derive(Debug, PartialEq)]
    enum Expect {
        Allow,
        Deny,
        Flagged,
    }

    fn expected(from: AccountStatus, to: AccountStatus) -> Expect {
        match (from, to) {
            (Closed, _) => Expect::Deny,
            (Pending | Suspended, Closed) => Expect::Deny,
            (Dormant, Dormant) | (Active, Active) => Expect::Deny,
            (_, Closed | Dormant | Active) => Expect::Allow,
            (f, t) if f == t => Expect::Allow,
            _ => Expect::Flagged,
        }
    }

    #[test]
    fn test_every_cell_of_standard_table() {
        let table = TransitionTable::standard();
        for from in AccountStatus::ALL {
            for to in AccountStatus::ALL {
                let actual = match table.rule(from, to) {
                    TransitionRule::Allowed => Expect::Allow,
                    TransitionRule::Denied(_) => Expect::Deny,
                    TransitionRule::Unreviewed => Expect::Flagged,
                };
                assert_eq!(actual, expected(from, to), "{from} -> {to}");
            }
        }
    }

    #[rstest]
    #[case(Closed, Active)]
    #[case(Closed, Inactive)]
    #[case(Closed, Frozen)]
    #[case(Closed, Dormant)]
    #[case(Closed, Closed)]
    #[case(Pending, Closed)]
    #[case(Suspended, Closed)]
    #[case(Dormant, Dormant)]
    #[case(Active, Active)]
    fn test_denied_transitions(#[case] from: AccountStatus, #[case] to: AccountStatus) {
        let result = TransitionTable::standard().check(from, to);
        assert!(matches!(result, Err(AccountError::IllegalTransition { .. })), "{from} -> {to}");
    }

    #[rstest]
    #[case(Active, Closed)]
    #[case(Frozen, Closed)]
    #[case(Active, Dormant)]
    #[case(Dormant, Active)]
    #[case(Suspended, Active)]
    fn test_guarded_transitions_that_pass(#[case] from: AccountStatus, #[case] to: AccountStatus) {
        assert!(TransitionTable::standard().check(from, to).is_ok());
    }

    #[test]
    fn test_active_to_suspended_passes_but_is_unreviewed() {
        let table = TransitionTable::standard();
        assert_eq!(table.rule(Active, Suspended), TransitionRule::Unreviewed);
        assert!(table.check(Active, Suspended).is_ok());
        assert!(table.unreviewed().contains(&(Active, Suspended)));
    }

    #[test]
    fn test_strict_table_denies_unreviewed() {
        let table = TransitionTable::standard().strict();
        assert!(table.unreviewed().is_empty());
        assert!(matches!(
            table.check(Active, Suspended),
            Err(AccountError::IllegalTransition { .. })
        ));
        // reviewed cells are untouched
        assert!(table.check(Active, Closed).is_ok());
    }

    #[test]
    fn test_with_rule_overrides_a_cell() {
        let table = TransitionTable::standard().with_rule(Active, Frozen, TransitionRule::Allowed);
        assert_eq!(table.rule(Active, Frozen), TransitionRule::Allowed);
        assert!(!table.unreviewed().contains(&(Active, Frozen)));
    }
}
