pub mod cli_client;
