use actix_web::{get, http::header::ContentType, App, HttpResponse, HttpServer, Responder};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec, TextEncoder,
};
use std::net::IpAddr;

lazy_static! {
    pub static ref DNS_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authd_requests_total",
        "Requests received, by transport protocol",
        &["protocol"]
    )
    .unwrap();
    pub static ref DNS_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authd_responses_total",
        "Responses sent, by RCODE",
        &["rcode"]
    )
    .unwrap();
    pub static ref DNS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "authd_dropped_total",
        "Queries answered with silence (rate limiting or garbage)"
    )
    .unwrap();
    pub static ref ZONE_UPDATES_TOTAL: IntCounter = register_int_counter!(
        "authd_zone_updates_total",
        "Dynamic updates applied"
    )
    .unwrap();
    pub static ref NOTIFY_SENT_TOTAL: IntCounter = register_int_counter!(
        "authd_notify_sent_total",
        "NOTIFY messages sent to secondaries"
    )
    .unwrap();
}

#[get("/metrics")]
async fn get_metrics() -> impl Responder {
    match TextEncoder::new().encode_to_string(&prometheus::gather()) {
        Ok(metrics_str) => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(metrics_str),
        Err(err) => HttpResponse::InternalServerError()
            .content_type(ContentType::plaintext())
            .body(err.to_string()),
    }
}

pub async fn serve_prometheus_endpoint_task(address: IpAddr, port: u16) -> std::io::Result<()> {
    HttpServer::new(|| App::new().service(get_metrics))
        .bind((address, port))?
        .run()
        .await
}
