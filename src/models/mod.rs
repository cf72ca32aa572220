pub mod agentmodel;
pub mod chatmodels;
