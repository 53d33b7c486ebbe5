mod formatter;
