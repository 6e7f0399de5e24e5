use crate::domain::types::{AuthorizationEvent, AuthorizationStage, TransitionError};

pub fn transition(
    current: &AuthorizationStage,
    event: &AuthorizationEvent,
) -> Result<AuthorizationStage, TransitionError> {
    match (current, event) {
        (AuthorizationStage::Unbound, AuthorizationEvent::CredentialBound) => {
            Ok(AuthorizationStage::CredentialCreated)
        }
        (AuthorizationStage::CredentialCreated, AuthorizationEvent::DigestSigned) => {
            Ok(AuthorizationStage::DigestSigned)
        }
        (AuthorizationStage::DigestSigned, AuthorizationEvent::TransactionSubmitted { .. }) => {
            Ok(AuthorizationStage::AuthorizationSubmitted)
        }
        (AuthorizationStage::AuthorizationSubmitted, AuthorizationEvent::ReceiptConfirmed) => {
            Ok(AuthorizationStage::Confirmed)
        }
        (AuthorizationStage::Confirmed, AuthorizationEvent::Failed { .. }) => Err(TransitionError {
            from: *current,
            event: format!("{event:?}"),
            reason: "confirmed authorization cannot fail".to_string(),
        }),
        (_, AuthorizationEvent::Failed { .. }) => Ok(AuthorizationStage::Unbound),
        _ => Err(TransitionError {
            from: *current,
            event: format!("{event:?}"),
            reason: "invalid transition".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn happy_path_walks_every_stage_in_order() {
        let mut stage = AuthorizationStage::Unbound;
        for event in [
            AuthorizationEvent::CredentialBound,
            AuthorizationEvent::DigestSigned,
            AuthorizationEvent::TransactionSubmitted {
                tx_hash: B256::repeat_byte(0xaa),
            },
            AuthorizationEvent::ReceiptConfirmed,
        ] {
            stage = transition(&stage, &event).expect("transition should be valid");
        }
        assert_eq!(stage, AuthorizationStage::Confirmed);
    }

    #[test]
    fn stages_cannot_be_skipped() {
        assert!(transition(
            &AuthorizationStage::Unbound,
            &AuthorizationEvent::DigestSigned
        )
        .is_err());
        assert!(transition(
            &AuthorizationStage::CredentialCreated,
            &AuthorizationEvent::TransactionSubmitted {
                tx_hash: B256::ZERO
            }
        )
        .is_err());
        let error = transition(
            &AuthorizationStage::DigestSigned,
            &AuthorizationEvent::ReceiptConfirmed,
        )
        .expect_err("receipt before submission must be rejected");
        assert_eq!(error.from, AuthorizationStage::DigestSigned);
        assert_eq!(error.reason, "invalid transition");
    }

    #[test]
    fn failure_returns_to_unbound_from_any_pending_stage() {
        for stage in [
            AuthorizationStage::Unbound,
            AuthorizationStage::CredentialCreated,
            AuthorizationStage::DigestSigned,
            AuthorizationStage::AuthorizationSubmitted,
        ] {
            let next = transition(
                &stage,
                &AuthorizationEvent::Failed {
                    reason: "boom".to_string(),
                },
            )
            .expect("failure should always be accepted before confirmation");
            assert_eq!(next, AuthorizationStage::Unbound);
        }
    }

    #[test]
    fn confirmed_is_terminal() {
        assert!(transition(
            &AuthorizationStage::Confirmed,
            &AuthorizationEvent::Failed {
                reason: "late".to_string()
            }
        )
        .is_err());
        assert!(transition(
            &AuthorizationStage::Confirmed,
            &AuthorizationEvent::CredentialBound
        )
        .is_err());
    }
}
