mod admin_user;
mod audit_log;
mod company;
mod course;
mod credential;
mod enrollment;
mod kpi;
mod person;
mod product_license;

pub use admin_user::*;
pub use audit_log::*;
pub use company::*;
pub use course::*;
pub use credential::*;
pub use enrollment::*;
pub use kpi::*;
pub use person::*;
pub use product_license::*;
