pub mod account_store;
