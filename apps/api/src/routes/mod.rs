pub mod health;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::screening::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening",
            get(handlers::handle_get_prescreening),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/generate",
            post(handlers::handle_generate),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/feedback",
            post(handlers::handle_feedback),
        )
        // Optimistic question mutations
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/questions",
            post(handlers::handle_add_question),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/questions/order",
            put(handlers::handle_reorder),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/questions/:question_id",
            delete(handlers::handle_delete_question),
        )
        // Persistence
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/messages",
            put(handlers::handle_update_messages),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/save",
            post(handlers::handle_save),
        )
        // Publishing
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/publish",
            post(handlers::handle_publish),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/status",
            post(handlers::handle_set_status),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/channels",
            post(handlers::handle_update_channels),
        )
        .route(
            "/api/v1/vacancies/:vacancy_id/prescreening/leave",
            post(handlers::handle_leave),
        )
        .with_state(state)
}
