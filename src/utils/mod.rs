pub mod email_html;
pub mod html_text;
pub mod local_files;
