pub mod customer;
pub mod draft;
pub mod product;
pub mod questionnaire;
pub mod quote;
