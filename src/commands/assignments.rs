//! Agent assignment commands

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::db::{now_timestamp, queries, Database};
use crate::{AppError, AppState, UserView};

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub complaint_id: String,
    pub agent_id: String,
    pub agent_name: Option<String>,
}

/// Assignment with the complaint (and optionally the agent) it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: queries::AssignmentRow,
    pub complaint: Option<queries::ComplaintRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<UserView>,
}

fn populate(
    db: &Database,
    rows: Vec<queries::AssignmentRow>,
    with_agent: bool,
) -> Result<Vec<AssignmentView>, AppError> {
    rows.into_iter()
        .map(|assignment| -> Result<AssignmentView, AppError> {
            let complaint = queries::get_complaint(db, &assignment.complaint_id)?;
            let agent = if with_agent {
                queries::get_user(db, &assignment.agent_id)?.map(UserView::from)
            } else {
                None
            };
            Ok(AssignmentView {
                assignment,
                complaint,
                agent,
            })
        })
        .collect()
}

pub async fn assign_agent(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(request): Json<AssignRequest>,
) -> Result<(StatusCode, Json<queries::AssignmentRow>), AppError> {
    identity.require_admin()?;

    let complaint_id = request.complaint_id.trim();
    let agent_id = request.agent_id.trim();
    if complaint_id.is_empty() || agent_id.is_empty() {
        return Err(AppError::Validation(
            "complaint_id and agent_id are required".to_string(),
        ));
    }

    let (complaint, agent) = {
        let (complaint_id, agent_id) = (complaint_id.to_string(), agent_id.to_string());
        state
            .store(move |db| {
                Ok((
                    queries::get_complaint(db, &complaint_id)?,
                    queries::get_user(db, &agent_id)?,
                ))
            })
            .await?
    };
    if complaint.is_none() {
        return Err(AppError::NotFound(format!("complaint not found: {complaint_id}")));
    }
    let agent = agent.ok_or_else(|| AppError::NotFound(format!("agent not found: {agent_id}")))?;
    if agent.user_type != Role::Agent.as_str() {
        return Err(AppError::Validation(format!("user {agent_id} is not an agent")));
    }

    let row = queries::AssignmentRow {
        id: Uuid::new_v4().to_string(),
        complaint_id: complaint_id.to_string(),
        agent_id: agent.id,
        agent_name: request
            .agent_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or(agent.name),
        created_at: now_timestamp(),
    };
    let stored = row.clone();
    state
        .store(move |db| Ok(queries::insert_assignment(db, &stored)?))
        .await?;

    tracing::info!(complaint = %row.complaint_id, agent = %row.agent_id, "agent assigned");
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn list_assignments(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
) -> Result<Json<Vec<AssignmentView>>, AppError> {
    let views = state
        .store(|db| populate(db, queries::list_assignments(db)?, true))
        .await?;
    Ok(Json(views))
}

pub async fn list_agent_assignments(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<AssignmentView>>, AppError> {
    let views = state
        .store(move |db| populate(db, queries::list_assignments_for_agent(db, &agent_id)?, false))
        .await?;
    Ok(Json(views))
}
