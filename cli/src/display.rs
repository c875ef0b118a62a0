use bson::{Bson, Document};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use shelf_core::aggregate::GroupSummary;
use shelf_core::{Book, CatalogReport, ReportPlan};

pub fn print_error(msg: &str) {
	eprintln!("{} {}", "✗".bright_red().bold(), msg.bright_red());
}

pub fn print_info(msg: &str) {
	println!("{} {}", "ℹ".bright_blue(), msg.bright_white());
}

pub fn print_success(msg: &str) {
	println!("{} {}", "✓".bright_green().bold(), msg.bright_green());
}

fn print_heading(title: &str) {
	println!();
	println!("{}", title.bright_cyan().bold());
}

fn new_table(header: Vec<&str>) -> Table {
	let mut table = Table::new();
	table
		.load_preset(UTF8_FULL)
		.set_content_arrangement(ContentArrangement::Dynamic)
		.set_header(header);
	table
}

fn cell(value: Option<&Bson>) -> String {
	match value {
		None | Some(Bson::Null) => "-".to_string(),
		Some(Bson::String(s)) => s.clone(),
		Some(Bson::Double(v)) => format!("{v:.2}"),
		Some(other) => other.to_string(),
	}
}

pub fn print_books(title: &str, books: &[Book]) {
	print_heading(&format!("{title} ({})", books.len()));
	if books.is_empty() {
		print_info("no books");
		return;
	}

	let mut table = new_table(vec!["Title", "Author", "Genre", "Year", "Price", "In stock"]);
	for book in books {
		table.add_row(vec![
			book.title.clone(),
			book.author.clone(),
			book.genre.clone(),
			book.published_year.to_string(),
			format!("{:.2}", book.price),
			if book.in_stock { "yes" } else { "no" }.to_string(),
		]);
	}
	println!("{table}");
}

pub fn print_documents(title: &str, docs: &[Document]) {
	print_heading(&format!("{title} ({})", docs.len()));
	let Some(first) = docs.first() else {
		print_info("no documents");
		return;
	};

	let columns: Vec<&str> = first.keys().map(String::as_str).collect();
	let mut table = new_table(columns.clone());
	for doc in docs {
		table.add_row(columns.iter().map(|c| cell(doc.get(*c))).collect::<Vec<_>>());
	}
	println!("{table}");
}

pub fn print_groups(title: &str, key: &str, groups: &[GroupSummary]) {
	print_heading(title);
	let Some(first) = groups.first() else {
		print_info("no groups");
		return;
	};

	let metrics: Vec<&str> = first.metrics.keys().map(String::as_str).collect();
	let mut header = vec![key];
	header.extend(metrics.iter().copied());
	let mut table = new_table(header);
	for group in groups {
		let mut row = vec![cell(Some(&group.key))];
		row.extend(metrics.iter().map(|m| cell(group.metric(m))));
		table.add_row(row);
	}
	println!("{table}");
}

/// Section titles that name the values a plan ran with.
#[derive(Debug, PartialEq)]
struct Headings {
	genre: String,
	published_after: String,
	author: String,
	in_stock: String,
	page: String,
	top_authors: String,
	explain: String,
}

impl Headings {
	fn for_plan(plan: &ReportPlan) -> Self {
		Self {
			genre: format!("Genre: {}", plan.genre),
			published_after: format!("Published after {}", plan.published_after),
			author: format!("By {}", plan.author),
			in_stock: format!("In stock, published after {}", plan.in_stock_after),
			page: format!("Page {} ({} per page)", plan.page_number, plan.per_page),
			top_authors: format!("Top {} author(s)", plan.top_authors),
			explain: format!("Explain lookup of \"{}\"", plan.explain_title),
		}
	}
}

pub fn print_report(report: &CatalogReport, plan: &ReportPlan) {
	let headings = Headings::for_plan(plan);

	print_books(&headings.genre, &report.by_genre);
	print_books(&headings.published_after, &report.published_after);
	print_books(&headings.author, &report.by_author);

	print_heading("Mutations");
	print_success(&format!(
		"price of \"{}\" set to {:.2}: matched {}, modified {}",
		plan.reprice_title, plan.new_price, report.repriced.matched, report.repriced.modified
	));
	print_success(&format!(
		"deleted {} book(s) titled \"{}\"",
		report.deleted, plan.delete_title
	));

	print_books(&headings.in_stock, &report.in_stock_recent);
	print_documents("Listing", &report.listing);
	print_books("By price, ascending", &report.cheapest_first);
	print_books("By price, descending", &report.dearest_first);
	print_books(&headings.page, &report.page);

	print_groups("Average price by genre", "genre", &report.average_price_by_genre);
	print_groups(&headings.top_authors, "author", &report.top_authors);
	print_groups("Books by decade", "decade", &report.books_by_decade);

	print_heading("Indexes");
	for name in &report.indexes {
		print_info(name);
	}

	print_heading(&headings.explain);
	print_info(&report.explain.to_string());
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn headings_follow_the_plan() {
		let plan = ReportPlan {
			genre: "Mystery".to_string(),
			published_after: 1990,
			author: "Agatha Christie".to_string(),
			page_number: 3,
			per_page: 4,
			..ReportPlan::default()
		};
		let headings = Headings::for_plan(&plan);

		assert_eq!(headings.genre, "Genre: Mystery");
		assert_eq!(headings.published_after, "Published after 1990");
		assert_eq!(headings.author, "By Agatha Christie");
		assert_eq!(headings.in_stock, "In stock, published after 2010");
		assert_eq!(headings.page, "Page 3 (4 per page)");
		assert_eq!(headings.explain, "Explain lookup of \"Dune\"");
	}

	#[test]
	fn cells_render_missing_and_prices() {
		assert_eq!(cell(None), "-");
		assert_eq!(cell(Some(&Bson::Null)), "-");
		assert_eq!(cell(Some(&Bson::Double(9.5))), "9.50");
		assert_eq!(cell(Some(&Bson::String("Dune".into()))), "Dune");
	}
}
