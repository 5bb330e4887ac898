pub mod cascade;
mod haar_xml;
