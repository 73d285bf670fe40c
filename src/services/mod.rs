pub mod authz;
pub mod ical;
pub mod images;
pub mod mentions;
pub mod ordering;
pub mod schedule;
pub mod signup;
