//! Route definitions for the Craftworks platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public register/login)
        .nest("/auth", auth_routes(state.clone()))
        // Payment provider callbacks (public, verified per provider)
        .nest("/webhooks", webhook_routes())
        // Protected routes
        .nest("/products", product_routes(state.clone()))
        .nest("/orders", order_routes(state.clone()))
        .nest("/productions", production_routes(state.clone()))
        .nest("/inventory", inventory_routes(state.clone()))
        .nest("/reports", report_routes(state))
}

/// Authentication routes
fn auth_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(handlers::me))
        .route("/users", post(handlers::create_user))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .merge(protected)
}

fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/xendit", post(handlers::xendit_webhook))
        .route("/maya", post(handlers::maya_webhook))
        .route("/stripe", post(handlers::stripe_webhook))
}

/// Product catalog routes (protected)
fn product_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route("/:product_id", get(handlers::get_product))
        .route(
            "/:product_id/bom",
            get(handlers::get_product_bom).put(handlers::upsert_bom_line),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Order routes (protected)
fn order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::checkout))
        .route("/mine", get(handlers::my_orders))
        .route("/pending", get(handlers::pending_orders))
        .route("/statistics", get(handlers::order_statistics))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/tracking", get(handlers::get_order_tracking))
        .route("/:order_id/cancel", post(handlers::cancel_order))
        .route("/:order_id/accept", post(handlers::accept_order))
        .route("/:order_id/reject", post(handlers::reject_order))
        .route("/:order_id/status", put(handlers::update_order_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Production routes (protected)
fn production_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_productions).post(handlers::create_production),
        )
        .route("/dashboard", get(handlers::production_dashboard))
        .route("/report", get(handlers::get_production_report))
        .route("/auto-advance", post(handlers::trigger_auto_advance))
        .route("/update-stages", post(handlers::trigger_update_stages))
        .route(
            "/:production_id",
            get(handlers::get_production).put(handlers::update_production),
        )
        .route(
            "/:production_id/stages/:log_id/start",
            post(handlers::start_stage),
        )
        .route(
            "/:production_id/stages/:log_id/complete",
            post(handlers::complete_stage),
        )
        .route(
            "/:production_id/stages/:log_id/progress",
            put(handlers::update_stage_progress),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Inventory routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/materials",
            get(handlers::list_materials).post(handlers::create_material),
        )
        .route("/materials/low-stock", get(handlers::low_stock_materials))
        .route("/materials/:material_id", get(handlers::get_material))
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::record_transaction),
        )
        .route(
            "/daily-output",
            get(handlers::list_daily_outputs).post(handlers::record_daily_output),
        )
        .route("/bom-deduction", post(handlers::deduct_bom))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Reporting routes (protected)
fn report_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/production", get(handlers::get_production_report))
        .route("/inventory/:kind", get(handlers::get_inventory_report))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
