use std::path::PathBuf;

use clap::Parser;

use super::*;

fn parse(args: &[&str]) -> Cli {
	Cli::try_parse_from(args).unwrap()
}

#[test]
fn parse_run_with_file() {
	let cli = parse(&["snow", "run", "fix.js"]);
	match cli.command {
		Commands::Run { script } => assert_eq!(script, Some(PathBuf::from("fix.js"))),
		_ => panic!("Expected Run command"),
	}
}

#[test]
fn parse_run_from_stdin() {
	let cli = parse(&["snow", "run"]);
	assert!(matches!(cli.command, Commands::Run { script: None }));
}

#[test]
fn elevate_defaults_to_security_admin() {
	let cli = parse(&["snow", "elevate"]);
	match cli.command {
		Commands::Elevate { role } => assert_eq!(role, "security_admin"),
		_ => panic!("Expected Elevate command"),
	}
}

#[test]
fn parse_search_command() {
	let cli = parse(&[
		"snow",
		"search",
		"incident",
		"-q",
		"active=true",
		"--order-by",
		"number",
		"--order-by",
		"priority",
		"--order-by-desc",
		"sys_created_on",
		"-f",
		"number,short_description",
		"-l",
		"25",
		"--display-values",
		"display",
		"--format",
		"csv",
		"-o",
		"out.csv",
	]);

	match cli.command {
		Commands::Search(args) => {
			assert_eq!(args.table, "incident");
			assert_eq!(args.query.as_deref(), Some("active=true"));
			assert_eq!(args.order_by, vec!["number", "priority"]);
			assert_eq!(args.order_by_desc, vec!["sys_created_on"]);
			assert_eq!(args.fields.as_deref(), Some("number,short_description"));
			assert_eq!(args.limit, Some(25));
			assert_eq!(args.display_values, DisplayMode::Display);
			assert_eq!(args.format, OutputFormat::Csv);
			assert_eq!(args.output, Some(PathBuf::from("out.csv")));
			assert!(!args.sys_id);
		}
		_ => panic!("Expected Search command"),
	}
}

#[test]
fn search_defaults() {
	let cli = parse(&["snow", "search", "incident"]);
	match cli.command {
		Commands::Search(args) => {
			assert_eq!(args.display_values, DisplayMode::Both);
			assert_eq!(args.format, OutputFormat::Table);
			assert!(args.order_by.is_empty());
			assert_eq!(args.limit, None);
		}
		_ => panic!("Expected Search command"),
	}
}

#[test]
fn excel_format_is_rejected() {
	assert!(Cli::try_parse_from(["snow", "search", "incident", "--format", "excel"]).is_err());
}

#[test]
fn global_flags_after_subcommand() {
	let cli = parse(&["snow", "count", "incident", "--instance", "dev1.service-now.com", "-vv"]);
	assert_eq!(cli.instance.as_deref(), Some("dev1.service-now.com"));
	assert_eq!(cli.verbose, 2);
	assert!(matches!(cli.command, Commands::Count { ref table, query: None } if table == "incident"));
}

#[test]
fn parse_instance_management() {
	assert!(matches!(parse(&["snow", "add", "--default"]).command, Commands::Add { instance: None, default: true }));
	assert!(matches!(parse(&["snow", "remove", "dev1", "-y"]).command, Commands::Remove { yes: true, .. }));
	assert!(matches!(parse(&["snow", "use", "dev1"]).command, Commands::Use { ref instance } if instance == "dev1"));
	assert!(matches!(parse(&["snow", "list"]).command, Commands::List));
	assert!(matches!(parse(&["snow", "mcp"]).command, Commands::Mcp));
}

#[test]
fn display_mode_converts_to_core_enum() {
	assert_eq!(DisplayValues::from(DisplayMode::Values), DisplayValues::Values);
	assert_eq!(DisplayValues::from(DisplayMode::Display), DisplayValues::Display);
	assert_eq!(DisplayValues::from(DisplayMode::Both), DisplayValues::Both);
}
