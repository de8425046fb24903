//! Route definitions for the butchery point-of-sale API

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        // Station notifications (token in the query string)
        .route("/ws/:station", get(handlers::station_ws))
        // Protected routes
        .merge(protected_routes(state))
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
}

/// Everything behind the bearer token
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/units", unit_routes())
        .nest("/products", product_routes())
        .nest("/inventory", inventory_routes())
        .nest("/tables", table_routes())
        .nest("/orders", order_routes())
        .route(
            "/order-items/:item_id/status",
            patch(handlers::update_item_status),
        )
        .route(
            "/waiter-actions/:order_id",
            get(handlers::get_waiter_actions),
        )
        .nest("/payments", payment_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Unit registry routes
fn unit_routes() -> Router<AppState> {
    Router::new().route("/", get(handlers::list_units).post(handlers::create_unit))
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route("/:product_id/price", get(handlers::price_product))
        .route(
            "/:product_id/conversions",
            get(handlers::list_conversions).post(handlers::add_conversion),
        )
        .route("/:product_id/convert", get(handlers::convert_quantity))
}

/// Stock ledger and transfer request routes
fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/stocks",
            get(handlers::list_stocks).post(handlers::receive_stock),
        )
        .route("/stocks/running-out", get(handlers::running_out))
        .route("/stocks/:stock_id/adjust", post(handlers::adjust_stock))
        .route("/transfers", post(handlers::transfer_stock))
        .route("/bartender-stocks", get(handlers::list_bartender_stocks))
        .route("/transactions", get(handlers::list_transactions))
        .route(
            "/requests",
            get(handlers::list_transfer_requests).post(handlers::create_transfer_request),
        )
        .route(
            "/requests/:request_id",
            get(handlers::get_transfer_request).patch(handlers::update_transfer_request),
        )
}

/// Dining table routes
fn table_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tables).post(handlers::create_table))
        .route("/:table_id", get(handlers::get_table))
}

/// Order routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/food", get(handlers::food_orders))
        .route("/beverage", get(handlers::beverage_orders))
        .route(
            "/:order_id",
            get(handlers::get_order)
                .patch(handlers::edit_order)
                .delete(handlers::delete_order),
        )
        .route("/:order_id/display", get(handlers::get_order_display))
        .route("/:order_id/updates", get(handlers::list_order_updates))
        .route("/:order_id/cashier", patch(handlers::print_bill))
        .route("/:order_id/payment", patch(handlers::set_payment_option))
        .route("/:order_id/cancel", post(handlers::cancel_order))
}

/// Payment routes
fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::settle_payment))
        .route("/:order_id", get(handlers::get_payment))
}
