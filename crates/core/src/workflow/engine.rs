//! Ticket workflow engine.
//!
//! Transition rules:
//! ```text
//! open -> in_progress
//! open -> resolved          (resolution_notes present, may be empty)
//! in_progress -> resolved   (resolution_notes present, may be empty)
//! open/in_progress/resolved -> closed
//! closed -> *               rejected
//! ```
//!
//! Validation happens before any network call; an invalid request never
//! reaches the transport. The server's returned ticket is the source of
//! truth - nothing is optimistically kept on failure.

use std::sync::Arc;

use tracing::debug;

use crate::error::ApiError;
use crate::metrics;
use crate::resource::{ResourceClient, Ticket, TicketStatus, TicketUpdate};
use crate::session::Role;

/// Validates and issues ticket status/assignment transitions.
pub struct WorkflowEngine {
    client: Arc<ResourceClient>,
}

impl WorkflowEngine {
    pub fn new(client: Arc<ResourceClient>) -> Self {
        Self { client }
    }

    /// Request a status transition for a ticket.
    ///
    /// `resolution_notes` must be present (possibly empty) for transitions
    /// into `resolved`; it is forwarded to the server along with the status.
    pub async fn transition(
        &self,
        ticket: &Ticket,
        to: TicketStatus,
        resolution_notes: Option<String>,
    ) -> Result<Ticket, ApiError> {
        validate_transition(ticket.status, to, resolution_notes.is_some())?;

        debug!(ticket_id = ticket.id, from = %ticket.status, to = %to, "ticket transition");
        metrics::WORKFLOW_TRANSITIONS
            .with_label_values(&[ticket.status.as_str(), to.as_str()])
            .inc();

        let update = TicketUpdate {
            status: Some(to),
            resolution_notes,
            ..Default::default()
        };
        self.client.update_ticket(ticket.id, &update).await
    }

    /// Assign a ticket to an agent.
    ///
    /// Orthogonal to status: allowed on any non-closed ticket and does not
    /// itself change status. Only admin and super_admin may assign; when
    /// the actor's role is known the check fails fast, otherwise the
    /// server's 403 decides.
    pub async fn assign(
        &self,
        ticket: &Ticket,
        agent_id: i64,
        actor_role: Option<Role>,
    ) -> Result<Ticket, ApiError> {
        if ticket.status.is_terminal() {
            return Err(ApiError::InvalidTransition {
                from: ticket.status,
                to: ticket.status,
            });
        }
        if let Some(role) = actor_role {
            if !role.can_assign_tickets() {
                return Err(ApiError::PermissionDenied(
                    "only admins may assign tickets".to_string(),
                ));
            }
        }

        debug!(ticket_id = ticket.id, agent_id = agent_id, "ticket assignment");
        let update = TicketUpdate {
            assigned_agent_id: Some(agent_id),
            ..Default::default()
        };
        self.client.update_ticket(ticket.id, &update).await
    }
}

/// Check a status transition against the workflow table.
pub fn validate_transition(
    from: TicketStatus,
    to: TicketStatus,
    has_resolution_notes: bool,
) -> Result<(), ApiError> {
    use TicketStatus::*;

    let permitted = match (from, to) {
        (Closed, _) => false,
        (Open, InProgress) => true,
        (Open, Resolved) | (InProgress, Resolved) => {
            if !has_resolution_notes {
                let mut fields = std::collections::BTreeMap::new();
                fields.insert(
                    "resolution_notes".to_string(),
                    "required when resolving a ticket".to_string(),
                );
                return Err(ApiError::ValidationFailed {
                    message: "resolving a ticket requires the resolution_notes field".to_string(),
                    fields,
                });
            }
            true
        }
        (Open, Closed) | (InProgress, Closed) | (Resolved, Closed) => true,
        _ => false,
    };

    if permitted {
        Ok(())
    } else {
        Err(ApiError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TicketStatus::*;

    #[test]
    fn test_open_to_in_progress() {
        assert!(validate_transition(Open, InProgress, false).is_ok());
    }

    #[test]
    fn test_resolve_requires_notes_field() {
        assert!(validate_transition(Open, Resolved, true).is_ok());
        assert!(validate_transition(InProgress, Resolved, true).is_ok());

        assert!(matches!(
            validate_transition(Open, Resolved, false),
            Err(ApiError::ValidationFailed { .. })
        ));
        assert!(matches!(
            validate_transition(InProgress, Resolved, false),
            Err(ApiError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_close_from_any_non_closed() {
        assert!(validate_transition(Open, Closed, false).is_ok());
        assert!(validate_transition(InProgress, Closed, false).is_ok());
        assert!(validate_transition(Resolved, Closed, false).is_ok());
    }

    #[test]
    fn test_closed_rejects_everything() {
        for to in [Open, InProgress, Resolved, Closed] {
            let result = validate_transition(Closed, to, true);
            assert!(
                matches!(result, Err(ApiError::InvalidTransition { from: Closed, .. })),
                "closed -> {} must be rejected",
                to
            );
        }
    }

    #[test]
    fn test_backward_moves_are_rejected() {
        assert!(matches!(
            validate_transition(InProgress, Open, false),
            Err(ApiError::InvalidTransition { .. })
        ));
        assert!(matches!(
            validate_transition(Resolved, Open, false),
            Err(ApiError::InvalidTransition { .. })
        ));
        assert!(matches!(
            validate_transition(Resolved, InProgress, false),
            Err(ApiError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_same_status_is_rejected() {
        for status in [Open, InProgress, Resolved, Closed] {
            assert!(matches!(
                validate_transition(status, status, true),
                Err(ApiError::InvalidTransition { .. })
            ));
        }
    }
}
