use crate::{
    api::{employee, leave_request, lookup, notification, payroll, schedule},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter: `requests_per_min` tokens, refilled evenly over a minute.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(handlers::me)
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    // static segments before /{id}
                    .service(web::resource("/import").route(web::post().to(employee::import_employees)))
                    .service(web::resource("/export").route(web::get().to(employee::export_employees)))
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/payroll")
                    .service(
                        web::resource("")
                            .route(web::post().to(payroll::create_payroll))
                            .route(web::get().to(payroll::list_payrolls)),
                    )
                    .service(web::resource("/generate").route(web::post().to(payroll::generate_payroll)))
                    .service(web::resource("/export").route(web::get().to(payroll::export_payrolls)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payroll::get_payroll))
                            .route(web::put().to(payroll::update_payroll)),
                    )
                    .service(
                        web::resource("/{id}/regenerate").route(web::post().to(payroll::regenerate_payroll)),
                    )
                    .service(web::resource("/{id}/approve").route(web::put().to(payroll::approve_payroll)))
                    .service(web::resource("/{id}/payslip").route(web::get().to(payroll::download_payslip))),
            )
            .service(
                web::scope("/schedules")
                    .service(
                        web::resource("")
                            .route(web::post().to(schedule::create_schedule))
                            .route(web::get().to(schedule::list_schedules)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(schedule::get_schedule))
                            .route(web::put().to(schedule::update_schedule))
                            .route(web::delete().to(schedule::delete_schedule)),
                    ),
            )
            .service(
                web::scope("/notifications")
                    .service(web::resource("").route(web::get().to(notification::list_notifications)))
                    .service(
                        web::resource("/unread-count").route(web::get().to(notification::get_unread_count)),
                    )
                    .service(web::resource("/read-all").route(web::put().to(notification::mark_all_read)))
                    .service(web::resource("/{id}/read").route(web::put().to(notification::mark_read))),
            )
            .service(
                web::scope("/leave")
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(web::resource("/{id}/approve").route(web::put().to(leave_request::approve_leave)))
                    .service(web::resource("/{id}/reject").route(web::put().to(leave_request::reject_leave))),
            )
            .service(
                web::resource("/lookups/{kind}")
                    .route(web::get().to(lookup::list_lookup))
                    .route(web::post().to(lookup::create_lookup)),
            ),
    );
}

// LOGIN
//  ├─ access_token
//  └─ refresh_token (jti stored, rotated on every refresh)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with Bearer refresh_token
//       └─ returns a new pair; the old refresh token is revoked
